//! Confirmation waiting: poll a channel until the expected token arrives.

use crate::device::DeviceChannel;
use crate::engine::Fault;
use crate::workflow::Step;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Wait for `step`'s acknowledgment on `channel`.
///
/// Lines are compared to `expected_ack` and `error_ack` by exact equality.
/// Anything else is discarded and polling continues with the time left until
/// the absolute deadline. A timeout is only reported once the deadline has
/// actually passed, even if the channel gives up early.
pub async fn await_confirmation<C>(channel: &mut C, step: &Step, step_index: usize) -> Result<(), Fault>
where
    C: DeviceChannel + ?Sized,
{
    let deadline = Instant::now() + step.timeout;

    loop {
        let now = Instant::now();
        if now >= deadline {
            warn!(device = %step.device, expected = %step.expected_ack, step_index, "Acknowledgment timed out");
            return Err(Fault::timeout(step_index, step));
        }

        let line = channel
            .receive_line(deadline - now)
            .await
            .map_err(|e| Fault::transport(step_index, step, &e))?;

        let Some(line) = line else {
            continue;
        };

        if line == step.expected_ack {
            debug!(device = %step.device, ack = %line, step_index, "Acknowledged");
            return Ok(());
        }
        if step.error_ack.as_deref() == Some(line.as_str()) {
            warn!(device = %step.device, token = %line, step_index, "Controller reported error");
            return Err(Fault::device_error(step_index, step, &line));
        }
        debug!(device = %step.device, line = %line, expected = %step.expected_ack, "Discarding line");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceId, MockChannel};
    use crate::engine::FaultKind;
    use std::time::Duration;

    fn cut_step() -> Step {
        Step::follow_up(DeviceId::Platform, "CUT COMPLETED")
            .or_error("CUT FAILED")
            .within(Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_matches_after_noise() {
        let mut channel = MockChannel::new(DeviceId::Platform);
        channel.inject_line("CUT START");
        channel.inject_line("DEBUG: motor 2 at 1400");
        channel.inject_line("CUT COMPLETED");
        assert!(await_confirmation(&mut channel, &cut_step(), 0).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_token_fails_immediately() {
        let mut channel = MockChannel::new(DeviceId::Platform);
        channel.inject_line("CUT FAILED");
        let started = Instant::now();
        let fault = await_confirmation(&mut channel, &cut_step(), 17).await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::DeviceError);
        assert_eq!(fault.detail, "CUT FAILED");
        assert_eq!(fault.step_index, 17);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_near_miss_never_matches() {
        let mut channel = MockChannel::new(DeviceId::Platform);
        channel.inject_line("CUT COMPLETE");
        channel.inject_line(" CUT COMPLETED");
        channel.inject_line("CUT  COMPLETED");
        channel.inject_line("cut completed");
        channel.inject_line("CUT FAILED!");
        let fault = await_confirmation(&mut channel, &cut_step(), 0).await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_not_before_deadline() {
        let mut channel = MockChannel::new(DeviceId::Platform);
        let started = Instant::now();
        let fault = await_confirmation(&mut channel, &cut_step(), 3).await.unwrap_err();
        assert_eq!(fault.kind, FaultKind::Timeout);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_whitespace_is_trimmed() {
        let mut channel = MockChannel::new(DeviceId::Platform);
        channel.inject_line("CUT COMPLETED\r\n");
        assert!(await_confirmation(&mut channel, &cut_step(), 0).await.is_ok());
    }
}
