use crate::camera::{CameraPlatform, ConstraintCandidate, MediaStream};

use super::error::{AcquisitionError, CandidateAttempt};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Walks the fallback chain in order and returns the first stream the
/// platform grants. Fails only once every candidate has been tried.
pub async fn negotiate<P: CameraPlatform>(
    platform: &P,
    chain: &[ConstraintCandidate],
) -> Result<P::Stream, AcquisitionError> {
    let mut attempts = Vec::with_capacity(chain.len());

    for (index, candidate) in chain.iter().enumerate() {
        match platform.acquire(candidate, index).await {
            Ok(stream) => {
                let granted = stream.granted();
                log_info!(
                    "camera granted with candidate #{index} '{}' ({}x{}, {})",
                    candidate.label,
                    granted.width,
                    granted.height,
                    granted.facing.as_str()
                );
                return Ok(stream);
            }
            Err(reason) => {
                log_warn!(
                    "camera candidate #{index} '{}' rejected: {reason}",
                    candidate.label
                );
                attempts.push(CandidateAttempt {
                    index,
                    label: candidate.label.clone(),
                    reason,
                });
            }
        }
    }

    Err(AcquisitionError::from_attempts(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{AcquisitionReason, FacingMode};
    use crate::scanner::test_support::FakeCamera;

    fn two_candidates() -> Vec<ConstraintCandidate> {
        vec![
            ConstraintCandidate::new("full-hd-env", FacingMode::Environment)
                .with_resolution(1920, 1080)
                .exact(),
            ConstraintCandidate::new("vga-any", FacingMode::Any).with_resolution(640, 480),
        ]
    }

    #[tokio::test]
    async fn falls_back_to_second_candidate_when_first_is_overconstrained() {
        let camera =
            FakeCamera::new().reject("full-hd-env", AcquisitionReason::ConstraintsUnsupported);
        let log = camera.log();

        let stream = negotiate(&camera, &two_candidates()).await.unwrap();

        assert_eq!(stream.granted().candidate_index, 1);
        assert_eq!(stream.granted().candidate.label, "vga-any");
        assert_eq!(log.attempts(), vec!["full-hd-env", "vga-any"]);
    }

    #[tokio::test]
    async fn first_acceptable_candidate_stops_the_walk() {
        let camera = FakeCamera::new();
        let log = camera.log();

        let stream = negotiate(&camera, &two_candidates()).await.unwrap();

        assert_eq!(stream.granted().candidate_index, 0);
        assert_eq!(log.attempts(), vec!["full-hd-env"]);
    }

    #[tokio::test]
    async fn exhausting_every_candidate_reports_each_attempt_in_order() {
        let camera = FakeCamera::new()
            .reject("full-hd-env", AcquisitionReason::ConstraintsUnsupported)
            .reject("vga-any", AcquisitionReason::DeviceBusy);
        let log = camera.log();

        let err = negotiate(&camera, &two_candidates()).await.err().unwrap();

        assert_eq!(err.reason, AcquisitionReason::DeviceBusy);
        let tried: Vec<(usize, &str)> = err
            .attempts
            .iter()
            .map(|a| (a.index, a.label.as_str()))
            .collect();
        assert_eq!(tried, vec![(0, "full-hd-env"), (1, "vga-any")]);
        assert_eq!(log.attempts(), vec!["full-hd-env", "vga-any"]);
        assert_eq!(log.acquired(), 0);
    }

    #[tokio::test]
    async fn empty_chain_fails_without_touching_the_platform() {
        let camera = FakeCamera::new();
        let log = camera.log();

        let err = negotiate(&camera, &[]).await.err().unwrap();

        assert_eq!(err.reason, AcquisitionReason::ConstraintsUnsupported);
        assert!(err.attempts.is_empty());
        assert!(log.attempts().is_empty());
    }
}
