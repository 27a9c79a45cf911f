//! Invoice entity for SeaORM.

use sea_orm::Set;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub total: i32,
    pub created: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::review::Entity")]
    Review,
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Review.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Conversion from SeaORM Model to Domain Invoice.
impl From<Model> for reviews_core::domain::Invoice {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            total: model.total,
            created_at: model.created.into(),
        }
    }
}

/// Conversion from Domain Invoice to SeaORM ActiveModel.
impl From<reviews_core::domain::Invoice> for ActiveModel {
    fn from(invoice: reviews_core::domain::Invoice) -> Self {
        Self {
            id: Set(invoice.id),
            total: Set(invoice.total),
            created: Set(invoice.created_at.into()),
        }
    }
}
