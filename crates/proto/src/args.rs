//! Argument payloads of the [CallRecord] union.
//!
//! Each payload is a packed, host-byte-order view over the first bytes of the fixed
//! [ARGS_SIZE]-byte argument area. Which view applies is decided by the call number alone.
//!
//! [CallRecord]: crate::CallRecord

use crate::CallNumber;

/// Size of the argument union, i.e. the size of its largest variant ([FileIoArgs]).
pub const ARGS_SIZE: usize = 32;

#[inline]
fn get_i32(buf: &[u8; ARGS_SIZE], at: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    i32::from_ne_bytes(raw)
}

#[inline]
fn get_u32(buf: &[u8; ARGS_SIZE], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_ne_bytes(raw)
}

#[inline]
fn get_u64(buf: &[u8; ARGS_SIZE], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_ne_bytes(raw)
}

#[inline]
fn put(buf: &mut [u8; ARGS_SIZE], at: usize, bytes: &[u8]) {
    buf[at..at + bytes.len()].copy_from_slice(bytes);
}

/// Arguments of `CLOSE`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CloseArgs {
    /// Guest socket handle to release.
    pub fd: i32,
}

impl CloseArgs {
    fn decode(buf: &[u8; ARGS_SIZE]) -> Self {
        Self { fd: get_i32(buf, 0) }
    }

    fn encode_into(&self, buf: &mut [u8; ARGS_SIZE]) {
        put(buf, 0, &self.fd.to_ne_bytes());
    }
}

/// The `fcntl` sub-commands understood by the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcntlCommand {
    /// `F_GETFL`: read the file status flags.
    GetFlags,
    /// `F_SETFL`: replace the file status flags.
    SetFlags,
    /// Anything else. Rejected with `EINVAL` before reaching a handler.
    Other(i32),
}

impl FcntlCommand {
    /// Raw value of `F_GETFL`.
    pub const F_GETFL: i32 = 3;
    /// Raw value of `F_SETFL`.
    pub const F_SETFL: i32 = 4;
}

impl From<i32> for FcntlCommand {
    fn from(cmd: i32) -> Self {
        match cmd {
            Self::F_GETFL => Self::GetFlags,
            Self::F_SETFL => Self::SetFlags,
            other => Self::Other(other),
        }
    }
}

impl From<FcntlCommand> for i32 {
    fn from(cmd: FcntlCommand) -> Self {
        match cmd {
            FcntlCommand::GetFlags => FcntlCommand::F_GETFL,
            FcntlCommand::SetFlags => FcntlCommand::F_SETFL,
            FcntlCommand::Other(other) => other,
        }
    }
}

/// Arguments of `FCNTL`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FcntlArgs {
    /// Guest socket handle.
    pub fd: i32,
    /// Raw sub-command. See [FcntlArgs::command].
    pub cmd: i32,
    /// New flags, only meaningful for `F_SETFL`.
    pub flags: i32,
}

impl FcntlArgs {
    /// Interprets the raw sub-command.
    pub fn command(&self) -> FcntlCommand {
        FcntlCommand::from(self.cmd)
    }

    fn decode(buf: &[u8; ARGS_SIZE]) -> Self {
        Self { fd: get_i32(buf, 0), cmd: get_i32(buf, 4), flags: get_i32(buf, 8) }
    }

    fn encode_into(&self, buf: &mut [u8; ARGS_SIZE]) {
        put(buf, 0, &self.fd.to_ne_bytes());
        put(buf, 4, &self.cmd.to_ne_bytes());
        put(buf, 8, &self.flags.to_ne_bytes());
    }
}

/// Arguments of `SOCKET`. Values are passed to the host unchanged.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SocketArgs {
    /// Address family, e.g. `AF_INET`.
    pub domain: i32,
    /// Socket type, e.g. `SOCK_STREAM`.
    pub ty: i32,
    /// Protocol, usually `0`.
    pub protocol: i32,
}

impl SocketArgs {
    fn decode(buf: &[u8; ARGS_SIZE]) -> Self {
        Self { domain: get_i32(buf, 0), ty: get_i32(buf, 4), protocol: get_i32(buf, 8) }
    }

    fn encode_into(&self, buf: &mut [u8; ARGS_SIZE]) {
        put(buf, 0, &self.domain.to_ne_bytes());
        put(buf, 4, &self.ty.to_ne_bytes());
        put(buf, 8, &self.protocol.to_ne_bytes());
    }
}

/// Arguments of `ACCEPT`. Both pointers are guest-virtual and may be `0` when the guest does not
/// want the peer address.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AcceptArgs {
    /// Listening guest socket handle.
    pub socket: i32,
    /// Guest buffer receiving the peer `sockaddr`.
    pub addr: u64,
    /// Guest pointer to an in/out `socklen_t`.
    pub addrlen_ptr: u64,
}

impl AcceptArgs {
    fn decode(buf: &[u8; ARGS_SIZE]) -> Self {
        Self { socket: get_i32(buf, 0), addr: get_u64(buf, 4), addrlen_ptr: get_u64(buf, 12) }
    }

    fn encode_into(&self, buf: &mut [u8; ARGS_SIZE]) {
        put(buf, 0, &self.socket.to_ne_bytes());
        put(buf, 4, &self.addr.to_ne_bytes());
        put(buf, 12, &self.addrlen_ptr.to_ne_bytes());
    }
}

/// Arguments of `BIND` and `CONNECT`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SocketAddrArgs {
    /// Guest socket handle.
    pub socket: i32,
    /// Guest-virtual address of the `sockaddr`.
    pub addr: u64,
    /// Length of the `sockaddr` in bytes.
    pub addrlen: u32,
}

impl SocketAddrArgs {
    fn decode(buf: &[u8; ARGS_SIZE]) -> Self {
        Self { socket: get_i32(buf, 0), addr: get_u64(buf, 4), addrlen: get_u32(buf, 12) }
    }

    fn encode_into(&self, buf: &mut [u8; ARGS_SIZE]) {
        put(buf, 0, &self.socket.to_ne_bytes());
        put(buf, 4, &self.addr.to_ne_bytes());
        put(buf, 12, &self.addrlen.to_ne_bytes());
    }
}

/// Arguments of `LISTEN`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenArgs {
    /// Guest socket handle.
    pub socket: i32,
    /// Pending connection queue length.
    pub backlog: i32,
}

impl ListenArgs {
    fn decode(buf: &[u8; ARGS_SIZE]) -> Self {
        Self { socket: get_i32(buf, 0), backlog: get_i32(buf, 4) }
    }

    fn encode_into(&self, buf: &mut [u8; ARGS_SIZE]) {
        put(buf, 0, &self.socket.to_ne_bytes());
        put(buf, 4, &self.backlog.to_ne_bytes());
    }
}

/// Arguments of `RECV` and `SEND`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferArgs {
    /// Guest socket handle.
    pub socket: i32,
    /// Guest-virtual address of the data buffer.
    pub buffer: u64,
    /// Buffer length in bytes.
    pub length: u64,
    /// `MSG_*` flags, passed to the host unchanged.
    pub flags: i32,
}

impl TransferArgs {
    fn decode(buf: &[u8; ARGS_SIZE]) -> Self {
        Self {
            socket: get_i32(buf, 0),
            buffer: get_u64(buf, 4),
            length: get_u64(buf, 12),
            flags: get_i32(buf, 20),
        }
    }

    fn encode_into(&self, buf: &mut [u8; ARGS_SIZE]) {
        put(buf, 0, &self.socket.to_ne_bytes());
        put(buf, 4, &self.buffer.to_ne_bytes());
        put(buf, 12, &self.length.to_ne_bytes());
        put(buf, 20, &self.flags.to_ne_bytes());
    }
}

/// Arguments of `WRITE_FILE` and `READ_FILE`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileIoArgs {
    /// Guest-virtual address of the data buffer.
    pub buffer: u64,
    /// Number of bytes to transfer.
    pub length: u64,
    /// Byte offset into the host file.
    pub offset: u64,
    /// Index into the host's virtual file table.
    pub index: u64,
}

impl FileIoArgs {
    fn decode(buf: &[u8; ARGS_SIZE]) -> Self {
        Self {
            buffer: get_u64(buf, 0),
            length: get_u64(buf, 8),
            offset: get_u64(buf, 16),
            index: get_u64(buf, 24),
        }
    }

    fn encode_into(&self, buf: &mut [u8; ARGS_SIZE]) {
        put(buf, 0, &self.buffer.to_ne_bytes());
        put(buf, 8, &self.length.to_ne_bytes());
        put(buf, 16, &self.offset.to_ne_bytes());
        put(buf, 24, &self.index.to_ne_bytes());
    }
}

/// Arguments of `SIZE_FILE`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SizeFileArgs {
    /// Index into the host's virtual file table.
    pub index: u64,
}

impl SizeFileArgs {
    fn decode(buf: &[u8; ARGS_SIZE]) -> Self {
        Self { index: get_u64(buf, 0) }
    }

    fn encode_into(&self, buf: &mut [u8; ARGS_SIZE]) {
        put(buf, 0, &self.index.to_ne_bytes());
    }
}

/// The argument union of a [CallRecord], tagged by its call number.
///
/// [CallRecord]: crate::CallRecord
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallArgs {
    /// `CLOSE`
    Close(CloseArgs),
    /// `FCNTL`
    Fcntl(FcntlArgs),
    /// `SOCKET`
    Socket(SocketArgs),
    /// `ACCEPT`
    Accept(AcceptArgs),
    /// `BIND`
    Bind(SocketAddrArgs),
    /// `CONNECT`
    Connect(SocketAddrArgs),
    /// `LISTEN`
    Listen(ListenArgs),
    /// `RECV`
    Recv(TransferArgs),
    /// `SEND`
    Send(TransferArgs),
    /// `WRITE_FILE`
    WriteFile(FileIoArgs),
    /// `READ_FILE`
    ReadFile(FileIoArgs),
    /// `SIZE_FILE`
    SizeFile(SizeFileArgs),
    /// A call number the tunnel does not recognize. The argument area is kept as-is.
    Unknown {
        /// The raw call number.
        call_number: u32,
        /// The raw argument area.
        raw: [u8; ARGS_SIZE],
    },
}

impl CallArgs {
    /// Decodes the argument area selected by `call_number`. Never fails: unrecognized numbers
    /// produce [CallArgs::Unknown].
    pub fn decode(call_number: u32, raw: &[u8; ARGS_SIZE]) -> Self {
        let Ok(number) = CallNumber::try_from(call_number) else {
            return Self::Unknown { call_number, raw: *raw };
        };

        match number {
            CallNumber::Close => Self::Close(CloseArgs::decode(raw)),
            CallNumber::Fcntl => Self::Fcntl(FcntlArgs::decode(raw)),
            CallNumber::Socket => Self::Socket(SocketArgs::decode(raw)),
            CallNumber::Accept => Self::Accept(AcceptArgs::decode(raw)),
            CallNumber::Bind => Self::Bind(SocketAddrArgs::decode(raw)),
            CallNumber::Connect => Self::Connect(SocketAddrArgs::decode(raw)),
            CallNumber::Listen => Self::Listen(ListenArgs::decode(raw)),
            CallNumber::Recv => Self::Recv(TransferArgs::decode(raw)),
            CallNumber::Send => Self::Send(TransferArgs::decode(raw)),
            CallNumber::WriteFile => Self::WriteFile(FileIoArgs::decode(raw)),
            CallNumber::ReadFile => Self::ReadFile(FileIoArgs::decode(raw)),
            CallNumber::SizeFile => Self::SizeFile(SizeFileArgs::decode(raw)),
        }
    }

    /// Returns the recognized call number, or the raw value for [CallArgs::Unknown].
    pub const fn number(&self) -> Result<CallNumber, u32> {
        Ok(match self {
            Self::Close(_) => CallNumber::Close,
            Self::Fcntl(_) => CallNumber::Fcntl,
            Self::Socket(_) => CallNumber::Socket,
            Self::Accept(_) => CallNumber::Accept,
            Self::Bind(_) => CallNumber::Bind,
            Self::Connect(_) => CallNumber::Connect,
            Self::Listen(_) => CallNumber::Listen,
            Self::Recv(_) => CallNumber::Recv,
            Self::Send(_) => CallNumber::Send,
            Self::WriteFile(_) => CallNumber::WriteFile,
            Self::ReadFile(_) => CallNumber::ReadFile,
            Self::SizeFile(_) => CallNumber::SizeFile,
            Self::Unknown { call_number, .. } => return Err(*call_number),
        })
    }

    /// Returns the raw call number that selects this variant on the wire.
    pub const fn call_number(&self) -> u32 {
        match self.number() {
            Ok(number) => number as u32,
            Err(raw) => raw,
        }
    }

    /// Overlays the fields of the active variant onto `buf`. Bytes the variant does not cover
    /// are left untouched.
    pub fn encode_into(&self, buf: &mut [u8; ARGS_SIZE]) {
        match self {
            Self::Close(args) => args.encode_into(buf),
            Self::Fcntl(args) => args.encode_into(buf),
            Self::Socket(args) => args.encode_into(buf),
            Self::Accept(args) => args.encode_into(buf),
            Self::Bind(args) | Self::Connect(args) => args.encode_into(buf),
            Self::Listen(args) => args.encode_into(buf),
            Self::Recv(args) | Self::Send(args) => args.encode_into(buf),
            Self::WriteFile(args) | Self::ReadFile(args) => args.encode_into(buf),
            Self::SizeFile(args) => args.encode_into(buf),
            Self::Unknown { raw, .. } => buf.copy_from_slice(raw),
        }
    }
}
