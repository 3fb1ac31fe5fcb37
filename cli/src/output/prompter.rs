//! `DialoguerPrompter`: terminal implementation of the `Prompter` port.

use anyhow::Result;

use crate::application::ports::Prompter;

/// Prompts on the terminal with dialoguer. In non-interactive mode every
/// question resolves to its default without touching the TTY.
pub struct DialoguerPrompter {
    non_interactive: bool,
}

impl DialoguerPrompter {
    #[must_use]
    pub fn new(non_interactive: bool) -> Self {
        Self { non_interactive }
    }
}

impl Prompter for DialoguerPrompter {
    fn is_interactive(&self) -> bool {
        !self.non_interactive
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }

    fn select(&self, prompt: &str, items: &[&str], default: usize) -> Result<usize> {
        if self.non_interactive {
            return Ok(default);
        }
        let picked = dialoguer::Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()?;
        Ok(picked)
    }
}
