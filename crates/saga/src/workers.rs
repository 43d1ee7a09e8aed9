use std::sync::Arc;

use broker::{BrokerSettings, Consumer, MessageBroker};
use orders::OrderService;
use stock::ExpirySweeper;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::handlers::{KitchenHandler, PaymentLinkHandler, StockConfirmationHandler};
use crate::payment::PaymentLinkCreator;

/// Runs the saga consumers and the reservation expiry sweeper.
///
/// All tasks share one shutdown channel; [`SagaWorkers::shutdown`] signals it and waits for
/// every task, so a message being processed is finished before the broker is closed.
pub struct SagaWorkers {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl SagaWorkers {
    /// Starts one consumer per saga step plus the sweeper.
    ///
    /// If a consumer cannot subscribe, the ones already running are stopped and the error
    /// is returned.
    #[tracing::instrument(skip_all)]
    pub async fn start(
        broker: Arc<dyn MessageBroker>,
        orders: OrderService,
        payments: Arc<dyn PaymentLinkCreator>,
        settings: BrokerSettings,
    ) -> Result<Self> {
        let (shutdown, _) = watch::channel(false);
        let mut workers = Self {
            shutdown,
            tasks: Vec::new(),
        };
        let stock = orders.stock().clone();

        let consumers = vec![
            Consumer::new(
                broker.clone(),
                PaymentLinkHandler::binding(),
                Arc::new(PaymentLinkHandler::new(orders.clone(), payments)),
                settings.clone(),
            ),
            Consumer::new(
                broker.clone(),
                StockConfirmationHandler::binding(),
                Arc::new(StockConfirmationHandler::new(stock.clone())),
                settings.clone(),
            ),
            Consumer::new(
                broker,
                KitchenHandler::binding(),
                Arc::new(KitchenHandler::new(orders)),
                settings,
            ),
        ];

        for consumer in consumers {
            let queue = consumer.queue().to_string();
            match consumer.start(workers.shutdown.subscribe()).await {
                Ok(handle) => workers.tasks.push((queue, handle)),
                Err(e) => {
                    tracing::error!(queue = %queue, error = %e, "Failed to start consumer");
                    workers.shutdown().await;
                    return Err(e.into());
                }
            }
        }

        let sweeper = ExpirySweeper::new(stock).spawn(workers.shutdown.subscribe());
        workers.tasks.push(("expiry-sweeper".to_string(), sweeper));

        tracing::info!(tasks = workers.tasks.len(), "Saga workers started");
        Ok(workers)
    }

    /// Names of the running tasks: consumer queues, then the sweeper.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Names of the tasks that have already ended although shutdown was never signalled,
    /// for example a consumer whose delivery stream failed.
    pub fn exited_tasks(&self) -> Vec<&str> {
        if *self.shutdown.borrow() {
            return Vec::new();
        }
        self.tasks
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// True while every task is still running.
    pub fn is_healthy(&self) -> bool {
        self.exited_tasks().is_empty()
    }

    /// Signals shutdown and waits for every task to finish.
    ///
    /// Tasks that had already ended on their own are reported first.
    pub async fn shutdown(self) {
        for name in self.exited_tasks() {
            tracing::warn!(task = %name, "Saga task exited before shutdown");
        }
        self.shutdown.send_replace(true);
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                tracing::error!(task = %name, error = %e, "Saga task ended abnormally");
            }
        }
        tracing::info!("Saga workers stopped");
    }
}
