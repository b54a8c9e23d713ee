//! # Receipt
//!
//! The value object emitted for a finalized sale. Rendering, printing and
//! sharing happen downstream; this module only assembles the data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::sale::{Sale, SaleLine, SaleStatus};
use crate::types::{PaymentMethod, PriceTier};

/// Business metadata printed on receipts, taken from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BusinessInfo {
    pub name: String,
    pub department_name: String,
    pub address_lines: Vec<String>,
    pub phone: Option<String>,
    pub currency_code: String,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: i64,
    pub unit_label: Option<String>,
    pub unit_price: Money,
    pub tier: PriceTier,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub sale_id: String,
    pub receipt_number: String,
    pub business: BusinessInfo,
    pub lines: Vec<ReceiptLine>,
    pub subtotal: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub customer_label: Option<String>,
    #[ts(as = "String")]
    pub sold_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
}

impl Receipt {
    /// Builds the receipt of a finalized sale. Pending and voided sales
    /// have no receipt.
    pub fn for_sale(sale: &Sale, lines: &[SaleLine], business: &BusinessInfo) -> CoreResult<Receipt> {
        if sale.status != SaleStatus::Finalized {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale.id.clone(),
                current_status: sale.status.to_string(),
                operation: "issue a receipt".to_string(),
            });
        }

        let mut ordered: Vec<&SaleLine> = lines.iter().collect();
        ordered.sort_by_key(|l| l.position);

        Ok(Receipt {
            sale_id: sale.id.clone(),
            receipt_number: sale.receipt_number.clone(),
            business: business.clone(),
            lines: ordered
                .into_iter()
                .map(|l| ReceiptLine {
                    name: l.name.clone(),
                    quantity: l.quantity,
                    unit_label: l.unit_label.clone(),
                    unit_price: l.unit_price,
                    tier: l.tier,
                    line_total: l.line_total,
                })
                .collect(),
            subtotal: sale.subtotal,
            total: sale.total,
            payment_method: sale.payment_method,
            customer_label: sale.customer_label.clone(),
            sold_at: sale.sold_at,
            issued_at: Utc::now(),
        })
    }
}
