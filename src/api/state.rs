use std::sync::Arc;

use tokio::time::Duration;

use crate::services::portfolio::PortfolioService;
use crate::services::report::ReportService;

#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<ReportService>,
    pub portfolio: Arc<PortfolioService>,
    pub default_wallet: Option<String>,
    pub report_timeout: Duration,
}
