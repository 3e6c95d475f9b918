pub mod session;
pub mod task;

pub use session::TokenBundle;
pub use task::{
    ActionItem, AddTaskRequest, ApiResponse, ConfirmTaskItem, ConfirmTasksRequest,
    ProcessTextRequest,
};
