//! `SeaORM` Entity for payments table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub entity_type: String,
    pub property: Option<String>,
    pub description: Option<String>,
    pub processor_reference: Option<String>,
    pub txn_date: Date,
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
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(has_many = "super::payment_components::Entity")]
    PaymentComponents,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::payment_components::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentComponents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
