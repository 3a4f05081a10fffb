// Application state for HTTP handlers
use crate::application::chart_service::ChartHandle;
use crate::application::control_service::MotorControlService;
use crate::application::device_link::LinkHandle;
use crate::application::history_service::HistoryHandle;

#[derive(Clone)]
pub struct AppState {
    pub link: LinkHandle,
    pub history: HistoryHandle,
    pub charts: ChartHandle,
    pub control: MotorControlService,
}
