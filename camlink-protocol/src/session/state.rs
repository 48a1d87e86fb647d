#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Idle,
    Recording,
    Capturing,
    Uploading,
    Playing,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionEvent {
    Pressed,
    Released,
    CaptureSucceeded,
    CaptureFailed,
    ResponseReady,
    UploadFailed,
    PlaybackFinished,
    PlaybackFailed,
    ErrorShown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitionError {
    pub state: SessionState,
    pub event: SessionEvent,
}

impl SessionState {
    pub fn next(self, event: SessionEvent) -> Result<SessionState, TransitionError> {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (S::Idle, E::Pressed) => Ok(S::Recording),
            (S::Recording, E::Released) => Ok(S::Capturing),
            (S::Capturing, E::CaptureSucceeded) => Ok(S::Uploading),
            (S::Capturing, E::CaptureFailed) => Ok(S::Error),
            (S::Uploading, E::ResponseReady) => Ok(S::Playing),
            (S::Uploading, E::UploadFailed) => Ok(S::Error),
            (S::Playing, E::PlaybackFinished) => Ok(S::Idle),
            (S::Playing, E::PlaybackFailed) => Ok(S::Error),
            (S::Error, E::ErrorShown) => Ok(S::Idle),
            (state, event) => Err(TransitionError { state, event }),
        }
    }
}

/// What the backend is asked to do with the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Short press: image only.
    Snapshot,
    /// Long press: image plus the recorded question.
    Conversation,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Snapshot => "snapshot",
            Mode::Conversation => "conversation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let mut state = SessionState::Idle;
        for event in [
            SessionEvent::Pressed,
            SessionEvent::Released,
            SessionEvent::CaptureSucceeded,
            SessionEvent::ResponseReady,
            SessionEvent::PlaybackFinished,
        ] {
            state = state.next(event).unwrap();
        }
        assert_eq!(state, SessionState::Idle);
    }

    #[test]
    fn every_failure_goes_through_error() {
        for (state, event) in [
            (SessionState::Capturing, SessionEvent::CaptureFailed),
            (SessionState::Uploading, SessionEvent::UploadFailed),
            (SessionState::Playing, SessionEvent::PlaybackFailed),
        ] {
            let error = state.next(event).unwrap();
            assert_eq!(error, SessionState::Error);
            assert_eq!(error.next(SessionEvent::ErrorShown), Ok(SessionState::Idle));
        }
    }

    #[test]
    fn unlisted_transitions_are_rejected() {
        assert_eq!(
            SessionState::Idle.next(SessionEvent::Released),
            Err(TransitionError {
                state: SessionState::Idle,
                event: SessionEvent::Released
            })
        );
        assert!(SessionState::Recording.next(SessionEvent::Pressed).is_err());
        assert!(SessionState::Uploading.next(SessionEvent::PlaybackFinished).is_err());
        assert!(SessionState::Error.next(SessionEvent::Pressed).is_err());
    }

    #[test]
    fn mode_names() {
        assert_eq!(Mode::Snapshot.as_str(), "snapshot");
        assert_eq!(Mode::Conversation.as_str(), "conversation");
    }
}
