//! Terminal dimensions and the fixed pseudo-terminal settings.
//!
//! The remote shell runs on a pseudo-terminal whose size follows the browser
//! terminal.  [`TerminalSize`] is the only mutable property; the terminal type
//! and the mode table are the same for every session.

use std::fmt;

/// Terminal type requested for every pseudo-terminal.
pub const TERMINAL_TYPE: &str = "xterm";

/// A pseudo-terminal mode understood by the remote session layer.
///
/// The SSH infrastructure maps these onto its own opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalMode {
    /// Local echo of typed characters.
    Echo,
    /// Input baud rate.  Informational only; no pacing is applied.
    InputSpeed,
    /// Output baud rate.  Informational only; no pacing is applied.
    OutputSpeed,
}

/// Modes sent with every pseudo-terminal request.
///
/// Echo is enabled so the remote side renders what the user types; the
/// 14.4 kbaud speeds are what most servers expect to see and have no effect
/// on throughput.
pub const TERMINAL_MODES: [(TerminalMode, u32); 3] = [
    (TerminalMode::Echo, 1),
    (TerminalMode::InputSpeed, 14_400),
    (TerminalMode::OutputSpeed, 14_400),
];

/// Dimensions of a terminal in character cells.
///
/// Both fields are strictly positive.  The only way to build one is through
/// [`TerminalSize::new`], which enforces that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerminalSize {
    rows: u32,
    columns: u32,
}

impl TerminalSize {
    /// Creates a size, or `None` if either dimension is zero.
    ///
    /// # Example
    ///
    /// ```rust
    /// use webssh_core::TerminalSize;
    ///
    /// let size = TerminalSize::new(24, 80).unwrap();
    /// assert_eq!(size.rows(), 24);
    /// assert!(TerminalSize::new(0, 80).is_none());
    /// ```
    pub fn new(rows: u32, columns: u32) -> Option<Self> {
        if rows == 0 || columns == 0 {
            return None;
        }
        Some(Self { rows, columns })
    }

    /// Number of character rows.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of character columns.
    pub fn columns(&self) -> u32 {
        self.columns
    }
}

impl fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.columns)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
