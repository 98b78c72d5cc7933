use std::sync::Arc;

use crate::api::PriceSource;
use crate::discovery::scheduler::SharedEngine;
use crate::portfolio::PositionTracker;

pub mod commands;
pub mod notification;

#[derive(Clone)]
pub struct BotState {
    pub engines: Vec<SharedEngine>,
    pub positions: Arc<PositionTracker>,
    pub prices: Arc<dyn PriceSource>,
    /// User IDs allowed to use the bot
    pub authorized_users: Vec<i64>,
}

impl BotState {
    pub fn is_authorized(&self, user_id: Option<i64>) -> bool {
        match user_id {
            Some(id) => self.authorized_users.contains(&id),
            None => false,
        }
    }
}
