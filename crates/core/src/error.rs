use thiserror::Error;

use crate::model::{ParamsError, ReviewError, SlotError};
use crate::scheduler::SchedulerError;

/// Any validation failure raised by the domain layer.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
