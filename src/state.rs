use crate::config::Config;
use crate::error::AppError;
use crate::services::attendance::AttendanceService;
use crate::services::erp::ErpClient;
use crate::services::quiz::QuizService;
use crate::utils::clock::{self, SharedClock};
use crate::utils::metrics::PerformanceMonitor;

/// Shared application state, registered once as `web::Data<AppState>`.
pub struct AppState {
    pub config: Config,
    pub erp: ErpClient,
    pub attendance: AttendanceService,
    pub quizzes: QuizService,
    pub metrics: PerformanceMonitor,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        Self::with_clock(config, clock::system())
    }

    pub fn with_clock(config: Config, clock: SharedClock) -> Result<Self, AppError> {
        let erp = ErpClient::new(&config)?;
        let attendance = AttendanceService::new(&config, erp.clone(), clock);
        let quizzes = QuizService::new(&config, erp.clone());
        Ok(Self {
            config,
            erp,
            attendance,
            quizzes,
            metrics: PerformanceMonitor::new(),
        })
    }
}
