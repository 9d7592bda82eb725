use crate::backend::{Backend, BackendError};
use crate::config::TimingConfig;
use nfse_common::protocol::{ElementHandle, SubmitKey};
use rand::Rng;
use std::time::Duration;

/// Type `text` one character at a time with a random pause between
/// keystrokes, then optionally press Enter or Tab.
///
/// The element is not cleared here.
pub async fn type_human(
    backend: &mut dyn Backend,
    element: &ElementHandle,
    text: &str,
    submit: Option<SubmitKey>,
    timing: &TimingConfig,
) -> Result<(), BackendError> {
    let mut buf = [0u8; 4];
    for c in text.chars() {
        backend.send_keys(element, c.encode_utf8(&mut buf)).await?;
        pause(timing.keystroke_min_ms, timing.keystroke_max_ms).await;
    }
    pause(timing.typing_pause_min_ms, timing.typing_pause_max_ms).await;

    if let Some(key) = submit {
        backend.press_key(element, key).await?;
    }
    Ok(())
}

async fn pause(min_ms: u64, max_ms: u64) {
    let ms = random_between(min_ms, max_ms);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

fn random_between(min_ms: u64, max_ms: u64) -> u64 {
    if max_ms <= min_ms {
        return min_ms;
    }
    rand::thread_rng().gen_range(min_ms..=max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_between_bounds() {
        for _ in 0..100 {
            let ms = random_between(50, 150);
            assert!((50..=150).contains(&ms));
        }
        assert_eq!(random_between(7, 3), 7);
    }
}
