use thiserror::Error;

/// Failures that abort a music command before it touches guild state, plus
/// the playback failures the controller absorbs and logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MusicError {
    #[error("You need to be in a voice channel to use this command.")]
    UserNotInVoice,

    #[error("No results found for \"{0}\"")]
    ResolutionFailed(String),

    #[error("Could not join the voice channel: {0}")]
    ConnectFailed(String),

    #[error("Playback failed: {0}")]
    Playback(String),
}

impl MusicError {
    /// Errors the user caused and can fix, as opposed to upstream failures.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::UserNotInVoice | Self::ResolutionFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_replies_sent_to_users() {
        assert_eq!(
            MusicError::UserNotInVoice.to_string(),
            "You need to be in a voice channel to use this command."
        );
        assert_eq!(
            MusicError::ResolutionFailed("song a".into()).to_string(),
            "No results found for \"song a\""
        );
        assert!(MusicError::ResolutionFailed(String::new()).is_user_facing());
        assert!(!MusicError::Playback("eof".into()).is_user_facing());
    }
}
