use std::sync::Arc;

use crate::bot::CovidBot;

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<CovidBot>,
}
