use std::time::{Duration, Instant};

use omsync_transport::{Clock, Transport};
use tracing::trace;

use crate::error::Result;

/// Out-of-block text that ends a reply.
pub const TERMINATOR: &str = "ok";

/// Longest single wait on the transport, so the deadline is rechecked often.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// How braces inside a reply are counted.
///
/// `Naive` counts every `{` and `}`, including ones inside quoted strings.
/// Controller replies never contain such characters, and extraction
/// boundaries must match what existing tooling sees, so it is the default.
/// A literal brace inside a string value desynchronises nesting in this mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BraceMode {
    #[default]
    Naive,
    /// Ignore braces inside double-quoted strings (honouring `\` escapes).
    QuoteAware,
}

/// Everything gathered from one reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Brace-balanced candidates, in arrival order.
    pub blocks: Vec<String>,
    /// Printable text seen outside any candidate.
    pub text: String,
    /// Whether the `ok` terminator was seen before the deadline.
    pub terminated: bool,
}

impl ScanOutcome {
    /// Whether `needle` appears anywhere in the reply.
    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle) || self.blocks.iter().any(|block| block.contains(needle))
    }
}

/// Incremental reply scanner.
///
/// Feed bytes with [`push`](Self::push); only printable ASCII (`0x20..=0x7E`)
/// is kept, everything else is dropped silently.
#[derive(Debug, Clone, Default)]
pub struct ResponseScanner {
    mode: BraceMode,
    depth: usize,
    in_block: String,
    out_of_block: String,
    blocks: Vec<String>,
    in_string: bool,
    escaped: bool,
    terminated: bool,
}

impl ResponseScanner {
    /// Create a scanner.
    pub fn new(mode: BraceMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Consume one byte. Returns `true` once the terminator has been seen.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.terminated {
            return true;
        }
        if !(0x20..=0x7E).contains(&byte) {
            return false;
        }
        let ch = char::from(byte);

        if self.depth == 0 {
            if ch == '{' {
                self.depth = 1;
                self.in_block.clear();
                self.in_block.push(ch);
            } else {
                self.out_of_block.push(ch);
            }
        } else {
            self.in_block.push(ch);
            if self.skip_quoted(ch) {
                return false;
            }
            match ch {
                '{' => self.depth += 1,
                '}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        self.blocks.push(std::mem::take(&mut self.in_block));
                    }
                }
                _ => {}
            }
        }

        if self.depth == 0 && self.out_of_block.ends_with(TERMINATOR) {
            self.terminated = true;
        }
        self.terminated
    }

    /// Whether the terminator has been seen.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Stop scanning and return what was gathered. An unbalanced trailing
    /// candidate is discarded.
    pub fn finish(self) -> ScanOutcome {
        ScanOutcome {
            blocks: self.blocks,
            text: self.out_of_block,
            terminated: self.terminated,
        }
    }

    // Returns true when `ch` is string content that must not affect nesting.
    fn skip_quoted(&mut self, ch: char) -> bool {
        if self.mode == BraceMode::Naive {
            return false;
        }
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return true;
        }
        if ch == '"' {
            self.in_string = true;
            return true;
        }
        false
    }
}

/// Read a reply from `transport` until the terminator or `deadline`.
///
/// Only transport failures are errors; a reply that never terminates simply
/// comes back with `terminated == false`.
pub fn scan<T, C>(
    transport: &mut T,
    clock: &C,
    deadline: Instant,
    mode: BraceMode,
) -> Result<ScanOutcome>
where
    T: Transport + ?Sized,
    C: Clock + ?Sized,
{
    let mut scanner = ResponseScanner::new(mode);
    loop {
        let now = clock.now();
        if now >= deadline {
            break;
        }
        let wait = (deadline - now).min(POLL_SLICE);
        if let Some(byte) = transport.read_byte(wait)? {
            if scanner.push(byte) {
                break;
            }
        }
    }

    let outcome = scanner.finish();
    trace!(
        blocks = outcome.blocks.len(),
        terminated = outcome.terminated,
        "scanned reply"
    );
    Ok(outcome)
}
