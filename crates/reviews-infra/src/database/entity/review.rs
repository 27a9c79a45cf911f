//! Review entity for SeaORM. Shares its primary key with the invoice.

use sea_orm::Set;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "reviews")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub created: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::invoice::Entity",
        from = "Column::Id",
        to = "super::invoice::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Invoice,
}

impl Related<super::invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoice.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for reviews_core::domain::Review {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            content: model.content,
            created_at: model.created.into(),
        }
    }
}

impl From<reviews_core::domain::Review> for ActiveModel {
    fn from(review: reviews_core::domain::Review) -> Self {
        Self {
            id: Set(review.id),
            content: Set(review.content),
            created: Set(review.created_at.into()),
        }
    }
}
