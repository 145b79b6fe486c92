use crate::{codes, Envelope, RequestError, TransportError};

/// Classified result of one transport attempt.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Outcome {
    Success(serde_json::Value),
    Retryable(RequestError),
    Terminal(RequestError),
}

impl Outcome {
    fn from_error(error: RequestError) -> Self {
        if error.is_retryable() {
            Self::Retryable(error)
        } else {
            Self::Terminal(error)
        }
    }
}

pub(crate) fn classify(result: Result<Envelope, TransportError>) -> Outcome {
    match result {
        Ok(envelope) => classify_envelope(envelope),
        Err(err) => Outcome::from_error(transport_error(err)),
    }
}

fn classify_envelope(envelope: Envelope) -> Outcome {
    if envelope.is_success() {
        return Outcome::Success(envelope.data);
    }
    let code = envelope.meta.code;
    let message = codes::business_message(&code)
        .map(str::to_owned)
        .unwrap_or(envelope.meta.message);
    Outcome::from_error(RequestError::Business { code, message })
}

/// Maps a transport failure onto the caller-facing error.
///
/// A reply that never arrived is a network error; so is a send failure
/// whose message names a socket-level code. Status errors are terminal.
pub(crate) fn transport_error(err: TransportError) -> RequestError {
    match err {
        TransportError::Status { status } => {
            #[cfg(feature = "tracing")]
            if codes::is_retryable_status(status) {
                tracing::debug!(status, "transient http status reported as terminal");
            }
            RequestError::Http {
                status,
                message: codes::http_status_message(status),
            }
        }
        TransportError::NoResponse { code } => RequestError::Network {
            message: codes::NO_RESPONSE_MESSAGE.to_owned(),
            code,
        },
        TransportError::NotSent { message } => match codes::find_network_code(&message) {
            Some(code) => RequestError::Network {
                message,
                code: Some(code.to_owned()),
            },
            None => RequestError::Transport(message),
        },
    }
}
