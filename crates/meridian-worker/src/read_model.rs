//! Asset register read model.
//!
//! Folds asset events into one row per asset number. Rows are upserted and
//! an event seen within the dedup window is not applied again, so replays and
//! redeliveries leave the register unchanged.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use meridian_core::dedup::RecentIds;
use meridian_core::error::DomainError;
use meridian_core::event::{
    ASSET_CATEGORY_CHANGED_EVENT_TYPE, ASSET_CREATED_EVENT_TYPE, ASSET_DISPOSED_EVENT_TYPE,
    ASSET_REVALUED_EVENT_TYPE, DEPRECIATION_CALCULATED_EVENT_TYPE, DomainEvent, EventKind,
};
use meridian_eventbus::{EventHandler, HandlerRegistry};
use serde::Serialize;
use uuid::Uuid;

/// Order at which the projection runs among handlers of the same event.
pub const PROJECTION_ORDER: i32 = 100;

/// Lifecycle state of a registered asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatus {
    Active,
    Disposed,
}

/// One row of the asset register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRecord {
    pub asset_number: String,
    pub description: String,
    pub category: String,
    pub currency: String,
    pub acquisition_date: NaiveDate,
    /// Cost, or the latest revalued amount, in minor units.
    pub carrying_amount: i64,
    pub accumulated_depreciation: i64,
    pub net_book_value: i64,
    pub status: AssetStatus,
    pub last_event_id: Uuid,
}

#[derive(Debug, Default)]
struct Register {
    assets: BTreeMap<String, AssetRecord>,
    applied: RecentIds,
}

/// Projection of asset events into the asset register.
#[derive(Debug, Default)]
pub struct AssetRegisterProjection {
    register: Mutex<Register>,
}

impl AssetRegisterProjection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Projection that remembers at most `window` applied event ids.
    #[must_use]
    pub fn with_window(window: usize) -> Self {
        Self {
            register: Mutex::new(Register {
                assets: BTreeMap::new(),
                applied: RecentIds::new(window),
            }),
        }
    }

    /// Registers the projection for every asset event type.
    pub fn register(self: &Arc<Self>, registry: &mut HandlerRegistry) {
        for event_type in [
            ASSET_CREATED_EVENT_TYPE,
            ASSET_CATEGORY_CHANGED_EVENT_TYPE,
            ASSET_REVALUED_EVENT_TYPE,
            DEPRECIATION_CALCULATED_EVENT_TYPE,
            ASSET_DISPOSED_EVENT_TYPE,
        ] {
            registry.register(event_type, PROJECTION_ORDER, Arc::clone(self) as Arc<dyn EventHandler>);
        }
    }

    fn register_guard(&self) -> Result<MutexGuard<'_, Register>, DomainError> {
        self.register
            .lock()
            .map_err(|_| DomainError::Infrastructure("asset register lock poisoned".into()))
    }

    /// Row for `asset_number`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn get(&self, asset_number: &str) -> Result<Option<AssetRecord>, DomainError> {
        Ok(self.register_guard()?.assets.get(asset_number).cloned())
    }

    /// Number of registered assets.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, DomainError> {
        Ok(self.register_guard()?.assets.len())
    }

    fn existing<'a>(
        assets: &'a mut BTreeMap<String, AssetRecord>,
        asset_number: &str,
    ) -> Result<&'a mut AssetRecord, DomainError> {
        assets.get_mut(asset_number).ok_or_else(|| {
            DomainError::Validation(format!("asset {asset_number} is not in the register"))
        })
    }
}

#[async_trait]
impl EventHandler for AssetRegisterProjection {
    fn name(&self) -> &str {
        "asset-register"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), DomainError> {
        let mut register = self.register_guard()?;
        if register.applied.contains(&event.event_id) {
            return Ok(());
        }

        let assets = &mut register.assets;
        match &event.kind {
            EventKind::AssetCreated(created) => {
                assets.insert(
                    created.asset_number.clone(),
                    AssetRecord {
                        asset_number: created.asset_number.clone(),
                        description: created.description.clone(),
                        category: created.category.clone(),
                        currency: created.currency.clone(),
                        acquisition_date: created.acquisition_date,
                        carrying_amount: created.acquisition_cost,
                        accumulated_depreciation: 0,
                        net_book_value: created.acquisition_cost,
                        status: AssetStatus::Active,
                        last_event_id: event.event_id,
                    },
                );
            }
            EventKind::AssetCategoryChanged(changed) => {
                let asset = Self::existing(assets, &changed.asset_number)?;
                asset.category.clone_from(&changed.new_category);
                asset.last_event_id = event.event_id;
            }
            EventKind::AssetRevalued(revalued) => {
                let asset = Self::existing(assets, &revalued.asset_number)?;
                let net_book_value = revalued
                    .new_value
                    .checked_sub(asset.accumulated_depreciation)
                    .ok_or_else(|| {
                        DomainError::Validation(format!(
                            "revaluation of {} to {} overflows net book value",
                            revalued.asset_number, revalued.new_value
                        ))
                    })?;
                asset.carrying_amount = revalued.new_value;
                asset.net_book_value = net_book_value;
                asset.last_event_id = event.event_id;
            }
            EventKind::DepreciationCalculated(depreciation) => {
                let asset = Self::existing(assets, &depreciation.asset_number)?;
                asset.accumulated_depreciation = depreciation.accumulated_depreciation;
                asset.net_book_value = depreciation.net_book_value;
                asset.last_event_id = event.event_id;
            }
            EventKind::AssetDisposed(disposed) => {
                let asset = Self::existing(assets, &disposed.asset_number)?;
                asset.status = AssetStatus::Disposed;
                asset.net_book_value = 0;
                asset.last_event_id = event.event_id;
            }
            _ => return Ok(()),
        }

        register.applied.insert(event.event_id);
        tracing::debug!(
            event_id = %event.event_id,
            event_type = event.event_type(),
            "asset register updated"
        );
        Ok(())
    }
}
