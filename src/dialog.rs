//! Retry prompt shown after requests exhaust their retries.

use std::fmt;

/// Button pressed on the retry prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogButton {
    /// Cancel: forget the failed requests.
    Left,
    /// Confirm: replay every failed request.
    Right,
}

/// Content of the retry prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPrompt {
    pub message: String,
    pub failed_count: usize,
    pub button_count: u8,
}

impl RetryPrompt {
    pub fn for_failures(failed_count: usize) -> Self {
        let mut message = String::from("网络连接异常");
        if failed_count > 1 {
            message.push_str(&format!("，{failed_count}个请求失败"));
        } else {
            message.push_str("，请求失败");
        }
        message.push_str("。请检查网络连接状况，然后点击确定重试。");

        Self {
            message,
            failed_count,
            button_count: 2,
        }
    }
}

/// One-shot answer channel for a prompt. Pressing consumes the reply.
pub struct DialogReply {
    on_press: Box<dyn FnOnce(DialogButton) + Send>,
}

impl DialogReply {
    pub fn new(on_press: impl FnOnce(DialogButton) + Send + 'static) -> Self {
        Self {
            on_press: Box::new(on_press),
        }
    }

    pub fn press(self, button: DialogButton) {
        (self.on_press)(button);
    }
}

impl fmt::Debug for DialogReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DialogReply")
    }
}

/// Blocking two-button confirmation presented to the user.
///
/// Implementations may answer synchronously inside `confirm` or keep the
/// reply and press it later.
pub trait Dialog: Send + Sync {
    fn confirm(&self, prompt: RetryPrompt, reply: DialogReply);
}

/// Headless dialog: logs the prompt and cancels.
#[derive(Clone, Copy, Debug, Default)]
pub struct DismissDialog;

impl Dialog for DismissDialog {
    fn confirm(&self, prompt: RetryPrompt, reply: DialogReply) {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            failed = prompt.failed_count,
            "{}; no interactive dialog, dismissing",
            prompt.message
        );
        #[cfg(not(feature = "tracing"))]
        let _ = prompt;

        reply.press(DialogButton::Left);
    }
}
