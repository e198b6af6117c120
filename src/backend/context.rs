// Backend context - what every renderer operation needs from the caller
//
// The device dispatch table, the queue used for uploads and idle waits,
// and the optional result callback. Every graphics-layer result passes
// through `check_result`, success included.

use std::sync::Arc;

use crate::gui::BackendId;
use crate::hal::{CommandQueue, Device, GraphicsResult, ResultCode};

/// Receives the result code of every graphics-layer call the renderer makes.
pub type CheckResultFn = Box<dyn Fn(ResultCode)>;

pub struct BackendContext<D: Device> {
    pub id: BackendId,
    pub device: Arc<D>,
    pub queue: CommandQueue,
    check_result_fn: Option<CheckResultFn>,
}

impl<D: Device> BackendContext<D> {
    pub fn new(device: Arc<D>, queue: CommandQueue, check_result_fn: Option<CheckResultFn>) -> Self {
        Self {
            id: BackendId::next(),
            device,
            queue,
            check_result_fn,
        }
    }

    pub fn check_result(&self, code: ResultCode) {
        if let Some(check) = &self.check_result_fn {
            check(code);
        }
    }

    /// Report the outcome of a graphics-layer call and keep its value.
    pub fn check<T>(&self, result: GraphicsResult<T>) -> Option<T> {
        self.check_result(ResultCode::of(&result));
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("Graphics call failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::headless::HeadlessDevice;
    use crate::hal::{GraphicsApi, GraphicsError};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn check_reports_every_outcome() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let device = Arc::new(HeadlessDevice::new(GraphicsApi::Vulkan));
        let ctx = BackendContext::new(
            device.clone(),
            device.queue(),
            Some(Box::new(move |code| sink.borrow_mut().push(code))),
        );

        assert_eq!(ctx.check(Ok::<_, GraphicsError>(5)), Some(5));
        assert_eq!(ctx.check::<u32>(Err(GraphicsError::DeviceLost)), None);
        assert_eq!(*seen.borrow(), vec![ResultCode::Success, ResultCode::DeviceLost]);
    }

    #[test]
    fn missing_callback_is_fine() {
        let device = Arc::new(HeadlessDevice::new(GraphicsApi::D3D12));
        let ctx = BackendContext::new(device.clone(), device.queue(), None);
        ctx.check_result(ResultCode::Failure);
        assert_eq!(ctx.check::<()>(Err(GraphicsError::Failure)), None);
    }
}
