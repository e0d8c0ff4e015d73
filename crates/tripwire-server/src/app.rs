use anyhow::Result;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tripwire_alert::analytics::AnalyticsAggregator;
use tripwire_alert::RuleEvaluator;
use tripwire_notify::escalation::{Escalator, StorePolicySource};
use tripwire_notify::{Dispatcher, ProviderRegistry};
use tripwire_storage::AlertStore;

use crate::config::ServerConfig;
use crate::scheduler::EvaluationScheduler;
use crate::service::AlertingService;

/// Every long-lived component, wired from one [`ServerConfig`].
pub struct App {
    pub store: Arc<AlertStore>,
    pub evaluator: RuleEvaluator,
    pub service: AlertingService,
    pub scheduler: EvaluationScheduler,
}

impl App {
    pub async fn build(config: &ServerConfig) -> Result<Self> {
        Self::build_with_registry(config, ProviderRegistry::default()).await
    }

    pub async fn build_with_registry(
        config: &ServerConfig,
        registry: ProviderRegistry,
    ) -> Result<Self> {
        tripwire_common::id::init(config.id.machine_id, config.id.node_id);

        let store = Arc::new(AlertStore::new(&config.database.url).await?);
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(registry));

        let mut evaluator = RuleEvaluator::new(
            store.clone(),
            dispatcher.clone(),
            config.evaluation.evaluator_config(),
        );
        if config.escalation.enabled {
            let escalator = Escalator::new(
                store.clone(),
                dispatcher.clone(),
                Arc::new(StorePolicySource::new(store.clone())),
                config.escalation.chain_steps,
            );
            evaluator = evaluator.with_escalator(Arc::new(escalator));
        } else {
            tracing::info!("Escalation disabled");
        }
        if config.analytics.enabled {
            evaluator = evaluator.with_analytics(Arc::new(AnalyticsAggregator::new(store.clone())));
        } else {
            tracing::info!("Analytics aggregation disabled");
        }

        let running = Arc::new(AtomicBool::new(false));
        let service = AlertingService::new(evaluator.clone(), running.clone());
        let scheduler =
            EvaluationScheduler::new(evaluator.clone(), config.evaluation.interval_secs, running);

        Ok(Self {
            store,
            evaluator,
            service,
            scheduler,
        })
    }
}
