use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = vehicles)]
#[diesel(belongs_to(User, foreign_key = owner_id))]
pub struct Vehicle {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub reg_number: String,
    pub model: String,
    pub vehicle_type: String,
    pub token: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = vehicles)]
pub struct NewVehicle {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub reg_number: String,
    pub model: String,
    pub vehicle_type: String,
    pub token: Option<String>,
}

/// Immutable audit record: one classifier verdict plus the images it was
/// rendered over. Exactly one of `user_id`/`vehicle_id` is set, selected by
/// `doc_type` (license documents hang off the user, everything else off a
/// vehicle).
#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(Vehicle, foreign_key = vehicle_id))]
pub struct Document {
    pub id: Uuid,
    pub doc_type: String,
    pub image_url: String,
    pub analysis_result: String,
    pub status: String,
    pub token: String,
    pub user_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub doc_type: String,
    pub image_url: String,
    pub analysis_result: String,
    pub status: String,
    pub token: String,
    pub user_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
