//! Line-oriented operator console.
//!
//! The console reads menu choices and values from any [`BufRead`] and
//! writes prompts and results to any [`Write`]. In production that is
//! stdin and stdout on a dedicated thread; tests drive it with in-memory
//! buffers. Every change goes through [`SiteStore`], so the console never
//! holds the store lock while it waits for input.
//!
//! # Menu
//!
//! | Choice | Action |
//! |--------|--------|
//! | `1` | Override every site's value, then optionally add new sites |
//! | `2` | List sites with their latest value |
//! | `3` | Top-K ranking |
//! | `4` | Add a site |
//! | `5` | Remove a site |
//! | `6` | Exit and shut the process down |

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use sitepulse_core::format::format_traffic;
use sitepulse_core::{auto_logo_ref, ranking, SiteStore, StoreError};
use tracing::{info, warn};

const RULE: &str = "----------------------------------------";

/// How a console session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The operator chose "Exit". The process should shut down.
    ExitRequested,
    /// Input reached end-of-file. The server keeps running.
    InputClosed,
}

/// Errors that end a console session.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// Reading input or writing output failed.
    #[error("console I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store is unusable (poisoned lock or broken window).
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of one menu action.
enum Flow {
    Continue,
    Exit(ConsoleExit),
}

/// Interactive console over a shared [`SiteStore`].
pub struct Console<R, W> {
    store: Arc<SiteStore>,
    default_top_k: usize,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    /// Create a console reading from `input` and writing to `output`.
    pub const fn new(store: Arc<SiteStore>, default_top_k: usize, input: R, output: W) -> Self {
        Self {
            store,
            default_top_k,
            input,
            output,
        }
    }

    /// Consume the console and return its output sink.
    #[cfg(test)]
    fn into_output(self) -> W {
        self.output
    }

    /// Run the menu loop until the operator exits or input ends.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Io`] if the terminal fails, or
    /// [`ConsoleError::Store`] if the store becomes unusable. Ordinary
    /// rejections (duplicate names, negative values) are printed and the
    /// loop continues.
    pub fn run(&mut self) -> Result<ConsoleExit, ConsoleError> {
        loop {
            self.print_menu()?;
            let Some(choice) = self.prompt("Choice: ")? else {
                return Ok(ConsoleExit::InputClosed);
            };

            let flow = match choice.as_str() {
                "1" => self.override_values()?,
                "2" => self.list_sites()?,
                "3" => self.show_top_k()?,
                "4" => self.add_site()?,
                "5" => self.remove_site()?,
                "6" => Flow::Exit(ConsoleExit::ExitRequested),
                "" => Flow::Continue,
                other => {
                    writeln!(self.output, "Unknown option: {other}")?;
                    Flow::Continue
                }
            };

            if let Flow::Exit(exit) = flow {
                return Ok(exit);
            }
        }
    }

    fn print_menu(&mut self) -> io::Result<()> {
        writeln!(self.output)?;
        writeln!(self.output, "===== SitePulse console =====")?;
        writeln!(self.output, "1. Override values")?;
        writeln!(self.output, "2. List sites")?;
        writeln!(self.output, "3. Top K")?;
        writeln!(self.output, "4. Add site")?;
        writeln!(self.output, "5. Remove site")?;
        writeln!(self.output, "6. Exit")
    }

    /// Print `text` and read one trimmed line. `None` at end of input.
    fn prompt(&mut self, text: &str) -> io::Result<Option<String>> {
        write!(self.output, "{text}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_owned()))
    }

    /// Prompt until a finite value `>= 0` is entered.
    ///
    /// A blank line returns `current` when one is given and re-prompts
    /// otherwise. `None` at end of input.
    fn prompt_value(&mut self, text: &str, current: Option<f64>) -> io::Result<Option<f64>> {
        loop {
            let Some(line) = self.prompt(text)? else {
                return Ok(None);
            };

            if line.is_empty() {
                if let Some(value) = current {
                    return Ok(Some(value));
                }
                writeln!(self.output, "Enter a number.")?;
                continue;
            }

            match line.parse::<f64>() {
                Ok(value) if !value.is_finite() => writeln!(self.output, "Enter a number.")?,
                Ok(value) if value < 0.0 => writeln!(self.output, "Value must be >= 0.")?,
                Ok(value) => return Ok(Some(value)),
                Err(_) => writeln!(self.output, "Enter a number.")?,
            }
        }
    }

    /// Print a rejection, or propagate it when the store is unusable.
    fn report(&mut self, err: StoreError) -> Result<(), ConsoleError> {
        match err {
            StoreError::Poisoned | StoreError::EmptyWindow { .. } => Err(err.into()),
            rejected => {
                warn!(error = %rejected, "Console request rejected");
                writeln!(self.output, "Rejected: {rejected}")?;
                Ok(())
            }
        }
    }

    /// Menu 1: walk every site, then accept extra names.
    fn override_values(&mut self) -> Result<Flow, ConsoleError> {
        let current = self.store.snapshot()?.latest_values();
        writeln!(
            self.output,
            "Enter traffic in billions. A blank line keeps the current value."
        )?;

        let mut batch = Vec::with_capacity(current.len());
        for (name, value) in current {
            let text = format!("{name} (current: {value:.3}): ");
            let Some(next) = self.prompt_value(&text, Some(value))? else {
                return Ok(Flow::Exit(ConsoleExit::InputClosed));
            };
            batch.push((name, next));
        }

        if !batch.is_empty() {
            match self.store.set_values(&batch) {
                Ok(()) => {
                    info!(sites = batch.len(), "Console override applied");
                    writeln!(self.output, "Updated {} sites.", batch.len())?;
                }
                Err(e) => self.report(e)?,
            }
        }

        loop {
            let Some(name) = self.prompt("New site name (blank to finish): ")? else {
                return Ok(Flow::Exit(ConsoleExit::InputClosed));
            };
            if name.is_empty() {
                return Ok(Flow::Continue);
            }

            let Some(value) = self.prompt_value(&format!("{name} value: "), None)? else {
                return Ok(Flow::Exit(ConsoleExit::InputClosed));
            };

            let result = if self.store.contains(&name)? {
                self.store.set_value(&name, value)
            } else {
                self.store.add_site(&name, &auto_logo_ref(&name), value)
            };
            match result {
                Ok(()) => writeln!(self.output, "Saved '{name}'.")?,
                Err(e) => self.report(e)?,
            }
        }
    }

    /// Menu 2.
    fn list_sites(&mut self) -> Result<Flow, ConsoleError> {
        let sites = self.store.snapshot()?.latest_values();

        writeln!(self.output, "{RULE}")?;
        if sites.is_empty() {
            writeln!(self.output, "(no sites)")?;
        }
        for (name, value) in &sites {
            writeln!(self.output, "{name:<20} {}", format_traffic(*value))?;
        }
        writeln!(self.output, "{RULE}")?;

        Ok(Flow::Continue)
    }

    /// Menu 3.
    fn show_top_k(&mut self) -> Result<Flow, ConsoleError> {
        let text = format!("K ({}): ", self.default_top_k);
        let Some(line) = self.prompt(&text)? else {
            return Ok(Flow::Exit(ConsoleExit::InputClosed));
        };

        let pairs = self.store.snapshot()?.latest_values();
        let ranked = if line.is_empty() {
            ranking::top_k(&pairs, self.default_top_k)
        } else if let Ok(k) = line.parse::<i64>() {
            ranking::top_k_signed(&pairs, k)
        } else {
            writeln!(self.output, "Enter a whole number.")?;
            return Ok(Flow::Continue);
        };

        writeln!(self.output, "{RULE}")?;
        for (rank, site) in (1_usize..).zip(&ranked) {
            writeln!(
                self.output,
                "{rank}. {:<20} {}",
                site.name,
                format_traffic(site.value)
            )?;
        }
        writeln!(self.output, "{RULE}")?;

        Ok(Flow::Continue)
    }

    /// Menu 4.
    fn add_site(&mut self) -> Result<Flow, ConsoleError> {
        let Some(name) = self.prompt("Site name: ")? else {
            return Ok(Flow::Exit(ConsoleExit::InputClosed));
        };
        let Some(value) = self.prompt_value("Traffic (billions): ", None)? else {
            return Ok(Flow::Exit(ConsoleExit::InputClosed));
        };
        let Some(logo) = self.prompt("Logo URL (blank for automatic): ")? else {
            return Ok(Flow::Exit(ConsoleExit::InputClosed));
        };

        let logo = if logo.is_empty() {
            auto_logo_ref(&name)
        } else {
            logo
        };
        match self.store.add_site(&name, &logo, value) {
            Ok(()) => writeln!(self.output, "Added '{name}'.")?,
            Err(e) => self.report(e)?,
        }

        Ok(Flow::Continue)
    }

    /// Menu 5.
    fn remove_site(&mut self) -> Result<Flow, ConsoleError> {
        let Some(name) = self.prompt("Site name: ")? else {
            return Ok(Flow::Exit(ConsoleExit::InputClosed));
        };

        if self.store.remove_site(&name)? {
            writeln!(self.output, "Removed '{name}'.")?;
        } else {
            writeln!(self.output, "No site named '{name}'.")?;
        }

        Ok(Flow::Continue)
    }
}
