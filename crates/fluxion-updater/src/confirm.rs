// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Yes/no decision before an update starts

use async_trait::async_trait;
use std::io::{BufRead, Write};

#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

/// Asks on the terminal. Anything but `y`/`yes` (including EOF) is a no.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, question: &str) -> bool {
        let question = question.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            let _ = write!(stdout, "{question} [y/N] ");
            let _ = stdout.flush();

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => is_yes(&line),
            Ok(Err(e)) => {
                tracing::warn!("Failed to read confirmation: {e}");
                false
            }
            Err(e) => {
                tracing::warn!("Confirmation prompt failed: {e}");
                false
            }
        }
    }
}

/// Fixed answer, for `--yes` and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl Confirm for FixedAnswer {
    async fn confirm(&self, question: &str) -> bool {
        tracing::info!("{question} -> {}", if self.0 { "yes" } else { "no" });
        self.0
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes("YES"));
        assert!(is_yes("  yes \r\n"));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }

    #[tokio::test]
    async fn test_fixed_answer() {
        assert!(FixedAnswer(true).confirm("Update?").await);
        assert!(!FixedAnswer(false).confirm("Update?").await);
    }
}
