//! `SeaORM` Entity for payouts table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "payouts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub fee_total_minor: i64,
    pub processor_reference: Option<String>,
    pub arrival_date: Date,
    pub sync_status: String,
    pub external_id: Option<String>,
    pub external_response: Option<Json>,
    pub sync_error: Option<Json>,
    pub last_sync_attempt_at: Option<DateTimeWithTimeZone>,
    pub synced_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payout_links::Entity")]
    PayoutLinks,
}

impl Related<super::payout_links::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PayoutLinks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
