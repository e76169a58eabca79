//! Non-blocking, resumable key-matrix scanner.
//!
//! The board's buttons sit on a grid of column lines and multiplexer
//! selector lines. [`KeyMatrix::poll`] reads exactly one cell per call and
//! then steps two nested counters. When a full pass completes, the scanner
//! stops and ignores further polls until the consumer calls
//! [`KeyMatrix::resume`]. That pause is the only synchronisation between
//! the interrupt side and the control loop, so a consumer always sees one
//! complete snapshot and never a half-written one.

use crate::error::ConfigError;

/// Logical access to the matrix peripherals.
///
/// The firmware implements this on GPIO pins; tests use a scripted fake.
/// How a pin is put into pull-up or analog mode is the implementor's
/// business.
pub trait MatrixIo {
    /// Error type of the underlying HAL.
    type Error;

    /// Drive the multiplexer selector lines to `state`.
    fn select_mux(&mut self, state: u8) -> Result<(), Self::Error>;

    /// Release column `previous` and enable column `column` for reading.
    fn select_column(&mut self, previous: usize, column: usize) -> Result<(), Self::Error>;

    /// Read the currently selected cell on `column`.
    ///
    /// Digital matrices return 0 (pulled low, pressed) or 1; analog matrices
    /// return the raw converter level.
    fn read(&mut self, column: usize) -> Result<u16, Self::Error>;
}

/// Which counter is the inner (fast) one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanOrder {
    /// Cycle every multiplexer state before moving to the next column.
    #[default]
    MuxFirst,
    /// Cycle every column before moving to the next multiplexer state.
    ColumnFirst,
}

/// Double-buffered scan state for an `N`-cell matrix.
///
/// Cells are written into a working buffer while the pass is in progress
/// and copied to the readable snapshot at the moment the pass completes,
/// so [`read`](Self::read) never returns a mix of two passes.
///
/// # Examples
///
/// ```
/// use hexboard_core::{KeyMatrix, MatrixIo, ScanOrder};
///
/// struct AllPressed;
/// impl MatrixIo for AllPressed {
///     type Error = core::convert::Infallible;
///     fn select_mux(&mut self, _: u8) -> Result<(), Self::Error> { Ok(()) }
///     fn select_column(&mut self, _: usize, _: usize) -> Result<(), Self::Error> { Ok(()) }
///     fn read(&mut self, _: usize) -> Result<u16, Self::Error> { Ok(0) }
/// }
///
/// let mut matrix: KeyMatrix<_, 8> = KeyMatrix::new(AllPressed, 2, 2, ScanOrder::MuxFirst).unwrap();
/// for _ in 0..8 {
///     matrix.poll().unwrap();
/// }
/// assert!(matrix.is_scan_complete());
/// assert_eq!(matrix.read(5), 0);
/// matrix.resume();
/// ```
pub struct KeyMatrix<IO, const N: usize> {
    io: IO,
    columns: usize,
    mux_bits: u8,
    order: ScanOrder,
    column: usize,
    mux: u8,
    scanning: [u16; N],
    snapshot: [u16; N],
    complete: bool,
}

impl<IO, const N: usize> KeyMatrix<IO, N> {
    /// Number of column lines.
    pub fn column_count(&self) -> usize {
        self.columns
    }

    /// Number of multiplexer states (`2^mux_bits`).
    pub fn mux_states(&self) -> usize {
        1 << self.mux_bits
    }

    /// Total number of cells.
    pub fn key_count(&self) -> usize {
        N
    }

    /// Configured scan order.
    pub fn order(&self) -> ScanOrder {
        self.order
    }

    /// Cell index for a column / multiplexer pair: `column << mux_bits | mux`.
    pub fn linear_index(&self, column: usize, mux: usize) -> usize {
        (column << self.mux_bits) | mux
    }

    /// Returns `true` once a full pass has finished and not yet been released.
    pub fn is_scan_complete(&self) -> bool {
        self.complete
    }

    /// Release the snapshot and restart scanning from cell (0, 0).
    ///
    /// Only a finished pass can be released. While a pass is still in
    /// progress this does nothing: the selector lines are wherever the
    /// counters say they are, and restarting the counters alone would
    /// file the next reading under the wrong cell.
    pub fn resume(&mut self) {
        if !self.complete {
            return;
        }
        // A finished pass has already wrapped both counters (and the
        // selector lines) back to (0, 0).
        self.complete = false;
        self.column = 0;
        self.mux = 0;
    }

    /// Copy out the completed snapshot and release it in one step.
    ///
    /// Returns `None` while a pass is still running. Meant to be called
    /// under whatever lock the scanning context shares, so the caller can
    /// work on the copy after the lock is dropped.
    pub fn take_snapshot(&mut self) -> Option<[u16; N]> {
        if !self.complete {
            return None;
        }
        let snapshot = self.snapshot;
        self.resume();
        Some(snapshot)
    }

    /// Last completed reading for cell `key`.
    ///
    /// Out-of-range keys read as released (1).
    pub fn read(&self, key: usize) -> u16 {
        self.snapshot.get(key).copied().unwrap_or(1)
    }

    /// Last completed reading at a multiplexer / column coordinate.
    pub fn read_at(&self, mux: usize, column: usize) -> u16 {
        self.read(self.linear_index(column, mux))
    }

    /// The full completed snapshot.
    pub fn snapshot(&self) -> &[u16; N] {
        &self.snapshot
    }

    /// Borrow the peripheral, e.g. to reconfigure pins from the firmware.
    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }
}

impl<IO, const N: usize> KeyMatrix<IO, N>
where
    IO: MatrixIo,
{
    /// Create a scanner over `columns × 2^mux_bits` cells.
    ///
    /// Every cell starts out as released (1).
    ///
    /// # Errors
    /// [`ConfigError::InvalidMatrix`] if the geometry does not match `N`.
    pub fn new(io: IO, columns: usize, mux_bits: u8, order: ScanOrder) -> Result<Self, ConfigError> {
        if columns == 0 || mux_bits > 8 || (columns << mux_bits) != N {
            return Err(ConfigError::InvalidMatrix);
        }
        Ok(Self {
            io,
            columns,
            mux_bits,
            order,
            column: 0,
            mux: 0,
            scanning: [1; N],
            snapshot: [1; N],
            complete: false,
        })
    }

    /// Read one cell and step the counters.
    ///
    /// Does nothing while a completed snapshot is waiting for
    /// [`resume`](Self::resume). Peripheral errors are returned unchanged;
    /// the counters do not advance past a failed read.
    pub fn poll(&mut self) -> Result<(), IO::Error> {
        if self.complete {
            return Ok(());
        }

        let index = self.linear_index(self.column, self.mux as usize);
        self.scanning[index] = self.io.read(self.column)?;

        let wrapped = match self.order {
            ScanOrder::MuxFirst => self.advance_mux()? && self.advance_column()?,
            ScanOrder::ColumnFirst => self.advance_column()? && self.advance_mux()?,
        };

        if wrapped {
            self.snapshot = self.scanning;
            self.complete = true;
        }
        Ok(())
    }

    // Both advance helpers return `true` when their counter wraps to zero.

    fn advance_mux(&mut self) -> Result<bool, IO::Error> {
        let states = self.mux_states();
        self.mux = ((self.mux as usize + 1) % states) as u8;
        self.io.select_mux(self.mux)?;
        Ok(self.mux == 0)
    }

    fn advance_column(&mut self) -> Result<bool, IO::Error> {
        let previous = self.column;
        self.column = (self.column + 1) % self.columns;
        self.io.select_column(previous, self.column)?;
        Ok(self.column == 0)
    }
}
