use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    AssetMintedEvent,
    AssetTransferredEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderCanceledEvent,
    OrderSettledEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_settled_producer: Vec<EventProducer<OrderSettledEvent>>,
    pub order_canceled_producer: Vec<EventProducer<OrderCanceledEvent>>,
    pub asset_minted_producer: Vec<EventProducer<AssetMintedEvent>>,
    pub asset_transferred_producer: Vec<EventProducer<AssetTransferredEvent>>,
}

pub struct EventHandlers {
    pub on_order_settled: Option<EventHandler<OrderSettledEvent>>,
    pub on_order_canceled: Option<EventHandler<OrderCanceledEvent>>,
    pub on_asset_minted: Option<EventHandler<AssetMintedEvent>>,
    pub on_asset_transferred: Option<EventHandler<AssetTransferredEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_settled = hooks.on_order_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_order_canceled = hooks.on_order_canceled.map(|f| EventHandler::new(buffer_size, f));
        let on_asset_minted = hooks.on_asset_minted.map(|f| EventHandler::new(buffer_size, f));
        let on_asset_transferred = hooks.on_asset_transferred.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_settled, on_order_canceled, on_asset_minted, on_asset_transferred }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_settled {
            result.order_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_canceled {
            result.order_canceled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_asset_minted {
            result.asset_minted_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_asset_transferred {
            result.asset_transferred_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_canceled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_asset_minted {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_asset_transferred {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_settled: Option<Handler<OrderSettledEvent>>,
    pub on_order_canceled: Option<Handler<OrderCanceledEvent>>,
    pub on_asset_minted: Option<Handler<AssetMintedEvent>>,
    pub on_asset_transferred: Option<Handler<AssetTransferredEvent>>,
}

impl EventHooks {
    pub fn on_order_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_settled = Some(Arc::new(f));
        self
    }

    pub fn on_order_canceled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCanceledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_canceled = Some(Arc::new(f));
        self
    }

    pub fn on_asset_minted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AssetMintedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_asset_minted = Some(Arc::new(f));
        self
    }

    pub fn on_asset_transferred<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AssetTransferredEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_asset_transferred = Some(Arc::new(f));
        self
    }
}
