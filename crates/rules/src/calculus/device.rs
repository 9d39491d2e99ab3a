/// A device passes only when it is non-empty and bound to the user.
pub fn is_device_bound(device_id: Option<&str>, bound: &[String]) -> bool {
    match device_id.map(str::trim) {
        Some(id) if !id.is_empty() => bound.iter().any(|d| d == id),
        _ => false,
    }
}
