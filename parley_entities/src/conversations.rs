use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub conversation_id: Uuid,
    pub initiator: String,
    /// JSON array of module ids
    #[sea_orm(column_type = "Text")]
    pub participants: String,
    pub status: String,
    pub turn_count: i64,
    pub started_at: DateTime,
    pub last_activity: DateTime,
    /// JSON object of tagged context values
    #[sea_orm(column_type = "Text")]
    pub context: String,
    pub reply_pending: bool,
    pub status_reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::conversation_messages::Entity")]
    Messages,
}

impl Related<super::conversation_messages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
