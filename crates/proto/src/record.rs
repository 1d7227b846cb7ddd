//! Contains the [CallRecord] type and its fixed-layout codec.

use crate::{args::ARGS_SIZE, CallArgs};

const CALL_NUMBER_AT: usize = 0;
const ARGS_AT: usize = 4;
const RETVAL_AT: usize = ARGS_AT + ARGS_SIZE;
const ERROR_AT: usize = RETVAL_AT + 8;

/// One request/response exchanged between guest and host.
///
/// The guest fills in the call number and arguments and traps with the record's address; the
/// host writes the same record back with [CallRecord::retval] and [CallRecord::error] set.
///
/// **Layout** (packed, host byte order):
/// | Bytes    | Field         |
/// |----------|---------------|
/// | [0, 4)   | `call_number` |
/// | [4, 36)  | `args`        |
/// | [36, 44) | `retval`      |
/// | [44, 52) | `error`       |
#[derive(Debug, Clone, Copy)]
pub struct CallRecord {
    /// The decoded argument union, which also carries the call number.
    pub args: CallArgs,
    /// Result of the operation. Conventionally `>= 0` on success and `-1` on failure.
    pub retval: i64,
    /// Error number of the operation, `0` when it succeeded.
    pub error: i64,
    /// The argument area as it was read, so that bytes outside the active variant survive a
    /// decode/encode cycle.
    residue: [u8; ARGS_SIZE],
}

impl CallRecord {
    /// Size of the record on the wire.
    pub const SIZE: usize = ERROR_AT + 8;

    /// Creates a request record for the given arguments, with `retval` and `error` zeroed.
    pub const fn new(args: CallArgs) -> Self {
        Self { args, retval: 0, error: 0, residue: [0u8; ARGS_SIZE] }
    }

    /// Returns the raw call number.
    pub const fn call_number(&self) -> u32 {
        self.args.call_number()
    }

    /// Decodes a record from its wire form. Every byte pattern is a valid record; call numbers
    /// the tunnel does not know decode to [CallArgs::Unknown].
    pub fn decode(raw: &[u8; Self::SIZE]) -> Self {
        let mut number = [0u8; 4];
        number.copy_from_slice(&raw[CALL_NUMBER_AT..ARGS_AT]);
        let mut residue = [0u8; ARGS_SIZE];
        residue.copy_from_slice(&raw[ARGS_AT..RETVAL_AT]);
        let mut retval = [0u8; 8];
        retval.copy_from_slice(&raw[RETVAL_AT..ERROR_AT]);
        let mut error = [0u8; 8];
        error.copy_from_slice(&raw[ERROR_AT..Self::SIZE]);

        Self {
            args: CallArgs::decode(u32::from_ne_bytes(number), &residue),
            retval: i64::from_ne_bytes(retval),
            error: i64::from_ne_bytes(error),
            residue,
        }
    }

    /// Encodes the record into its wire form.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut area = self.residue;
        self.args.encode_into(&mut area);

        let mut raw = [0u8; Self::SIZE];
        raw[CALL_NUMBER_AT..ARGS_AT].copy_from_slice(&self.call_number().to_ne_bytes());
        raw[ARGS_AT..RETVAL_AT].copy_from_slice(&area);
        raw[RETVAL_AT..ERROR_AT].copy_from_slice(&self.retval.to_ne_bytes());
        raw[ERROR_AT..Self::SIZE].copy_from_slice(&self.error.to_ne_bytes());
        raw
    }
}

/// Records compare by their wire form.
impl PartialEq for CallRecord {
    fn eq(&self, other: &Self) -> bool {
        self.encode() == other.encode()
    }
}

impl Eq for CallRecord {}

impl From<CallArgs> for CallRecord {
    fn from(args: CallArgs) -> Self {
        Self::new(args)
    }
}
