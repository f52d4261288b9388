pub mod confirmation;
pub mod fare;
pub mod lifecycle;
pub mod offers;
pub mod otp;
pub mod queries;
pub mod rating;
pub mod requests;
pub mod sweeper;
pub mod transitions;

use crate::error::AppError;
use crate::models::user::{Actor, UserAccount, UserRole};
use crate::state::AppState;

pub(crate) fn ensure_role(actor: &Actor, role: UserRole) -> Result<(), AppError> {
    if actor.role != role {
        return Err(AppError::RoleMismatch(role));
    }
    Ok(())
}

pub(crate) async fn active_customer(state: &AppState, actor: &Actor) -> Result<UserAccount, AppError> {
    state
        .store
        .find_user(actor.id)
        .await?
        .filter(|user| user.is_active && user.role == UserRole::Customer)
        .ok_or(AppError::NoActiveCustomer(actor.id))
}

pub(crate) async fn known_driver(state: &AppState, driver_id: uuid::Uuid) -> Result<UserAccount, AppError> {
    state
        .store
        .find_user(driver_id)
        .await?
        .filter(|user| user.role == UserRole::Driver)
        .ok_or(AppError::UserNotFound(driver_id))
}
