//! Price alerts and the alert evaluator.
//!
//! An alert is one-shot: it starts active and is deactivated exactly once,
//! the first time an evaluation sees the quote cross its target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::commodity::validate_symbol;
use super::error::CommodityxError;
use crate::ports::store_port::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertType {
    Above,
    Below,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Above => "ABOVE",
            AlertType::Below => "BELOW",
        }
    }

    /// Whether `current_price` satisfies the trigger condition for `target`.
    pub fn is_triggered(&self, current_price: f64, target: f64) -> bool {
        match self {
            AlertType::Above => current_price >= target,
            AlertType::Below => current_price <= target,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = CommodityxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ABOVE" => Ok(AlertType::Above),
            "BELOW" => Ok(AlertType::Below),
            _ => Err(CommodityxError::validation(
                "alert_type",
                "invalid alert type",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceAlert {
    pub id: i64,
    pub user_id: i64,
    pub commodity_symbol: String,
    pub alert_type: AlertType,
    pub target_price: f64,
    pub is_active: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An alert joined with its commodity's name and current price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: PriceAlert,
    pub name: Option<String>,
    pub current_price: Option<f64>,
}

impl AlertView {
    /// Evaluate against the joined price. Inactive alerts and alerts without
    /// a quote never trigger.
    pub fn should_trigger(&self) -> bool {
        match self.current_price {
            Some(price) if self.alert.is_active => {
                self.alert.alert_type.is_triggered(price, self.alert.target_price)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub commodity_symbol: String,
    pub alert_type: AlertType,
    pub target_price: f64,
}

impl NewAlert {
    pub fn parse(
        commodity_symbol: &str,
        alert_type: &str,
        target_price: f64,
    ) -> Result<NewAlert, CommodityxError> {
        validate_symbol(commodity_symbol)?;
        let alert_type = alert_type.trim().to_uppercase().parse::<AlertType>()?;
        if !(target_price.is_finite() && target_price > 0.0) {
            return Err(CommodityxError::validation(
                "target_price",
                "must be greater than 0",
            ));
        }
        Ok(NewAlert {
            commodity_symbol: commodity_symbol.trim().to_string(),
            alert_type,
            target_price,
        })
    }
}

/// Create an alert on a listed commodity. Returns the new alert id.
pub fn create_alert(
    store: &dyn Store,
    user_id: i64,
    alert: &NewAlert,
) -> Result<i64, CommodityxError> {
    if store.find_commodity(&alert.commodity_symbol)?.is_none() {
        return Err(CommodityxError::CommodityNotFound {
            symbol: alert.commodity_symbol.clone(),
        });
    }
    let id = store.create_alert(user_id, alert, Utc::now())?;
    tracing::debug!(
        user_id,
        alert_id = id,
        symbol = %alert.commodity_symbol,
        alert_type = %alert.alert_type,
        target = alert.target_price,
        "alert created"
    );
    Ok(id)
}

pub fn delete_alert(store: &dyn Store, user_id: i64, alert_id: i64) -> Result<(), CommodityxError> {
    if store.delete_alert(alert_id, user_id)? {
        Ok(())
    } else {
        Err(CommodityxError::AlertNotFound { id: alert_id })
    }
}

/// Evaluate every active alert against current quotes and fire the ones whose
/// condition holds.
///
/// Deactivation is conditional on the alert still being active, so an alert
/// claimed by a concurrent evaluation is skipped instead of firing twice.
pub fn check_alerts(
    store: &dyn Store,
    now: DateTime<Utc>,
) -> Result<Vec<AlertView>, CommodityxError> {
    let active = store.list_all_active_alerts()?;
    let mut triggered = Vec::new();

    for mut view in active {
        if !view.should_trigger() {
            continue;
        }
        if store.deactivate_alert(view.alert.id, now)? {
            view.alert.is_active = false;
            view.alert.triggered_at = Some(now);
            tracing::info!(
                alert_id = view.alert.id,
                user_id = view.alert.user_id,
                symbol = %view.alert.commodity_symbol,
                "price alert triggered"
            );
            triggered.push(view);
        }
    }

    Ok(triggered)
}
