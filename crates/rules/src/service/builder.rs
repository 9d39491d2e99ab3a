use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use attend_core::{CoreError, EngineConfig};

use super::stats::EngineCounters;
use super::RuleExecutionService;
use crate::alerting::{Dispatcher, LogNotifier, Notifier};
use crate::audit_log::AuditLog;
use crate::cache::{DistributedCache, RuleCache};
use crate::calculus::{AttendanceCalculus, AttendanceDirectory, InMemoryDirectory, WeekdayCalendar, WorkCalendar};
use crate::evaluator::{CustomEvaluator, EvaluatorFactory};
use crate::executor::{ActionHandler, RuleExecutor};
use crate::loader::RuleLoader;
use crate::validation::RuleValidator;

/// Assembles a [`RuleExecutionService`] from its collaborators.
///
/// Only the rule loader is required. Without a directory every user has
/// no sites or devices on file; without a calendar Monday to Friday are
/// working days; without a dispatcher notifications go to the log.
pub struct RuleExecutionServiceBuilder {
    loader: Arc<dyn RuleLoader>,
    config: EngineConfig,
    directory: Option<Arc<dyn AttendanceDirectory>>,
    calendar: Option<Arc<dyn WorkCalendar>>,
    dispatcher: Option<Dispatcher>,
    distributed: Option<Arc<dyn DistributedCache>>,
    evaluators: Vec<Arc<dyn CustomEvaluator>>,
    handlers: Vec<Arc<dyn ActionHandler>>,
}

impl RuleExecutionServiceBuilder {
    pub(super) fn new(loader: Arc<dyn RuleLoader>) -> Self {
        Self {
            loader,
            config: EngineConfig::default(),
            directory: None,
            calendar: None,
            dispatcher: None,
            distributed: None,
            evaluators: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Read the engine config from the environment (and `.env`).
    pub fn with_env_config(self) -> Self {
        attend_core::config::load_dotenv();
        self.with_config(EngineConfig::from_env())
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn AttendanceDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn WorkCalendar>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Add a default notification channel.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.dispatcher.get_or_insert_with(Dispatcher::empty).add_default(notifier);
        self
    }

    pub fn with_distributed_cache(mut self, cache: Arc<dyn DistributedCache>) -> Self {
        self.distributed = Some(cache);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn CustomEvaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> Result<RuleExecutionService, CoreError> {
        self.config.validate()?;

        let calculus = Arc::new(AttendanceCalculus::new(
            self.directory.unwrap_or_else(|| Arc::new(InMemoryDirectory::new())),
            self.calendar.unwrap_or_else(|| Arc::new(WeekdayCalendar)),
        ));
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Dispatcher::with_defaults(vec![Arc::new(LogNotifier) as Arc<dyn Notifier>]));

        let evaluators = Arc::new(EvaluatorFactory::new());
        for evaluator in self.evaluators {
            evaluators.register(evaluator);
        }
        let executor = Arc::new(RuleExecutor::new(Arc::clone(&calculus), Arc::new(dispatcher)));
        for handler in self.handlers {
            executor.register_handler(handler);
        }

        let store_timeout = self.config.store.timeout();
        let mut cache = RuleCache::new(&self.config.cache, store_timeout);
        if let Some(remote) = self.distributed {
            cache = cache.with_distributed(remote);
        }
        let validator = RuleValidator::new(
            Arc::clone(&self.loader),
            Arc::clone(&evaluators),
            Arc::clone(&executor),
            store_timeout,
        );

        self.config.log_summary();
        tracing::debug!(
            custom_evaluators = evaluators.custom_names().len(),
            custom_actions = executor.custom_action_types().len(),
            "rule execution service built"
        );

        Ok(RuleExecutionService {
            audit: AuditLog::with_max_entries(self.config.audit.max_entries_per_rule),
            config: self.config,
            loader: self.loader,
            cache,
            validator,
            evaluators,
            executor,
            calculus,
            counters: EngineCounters::default(),
            inputs: RwLock::new(HashMap::new()),
        })
    }
}
