//! Protocol objects: typed bundles of streams exchanged on a connection.

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::stream::Stream;

/// Kind of a protocol object: protocol, direction, and role.
///
/// Discriminants are stable and are written verbatim into the object log.
/// They follow the `stage * 100 + n` numbering of the filter stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ObjectType {
    Null = 0,
    TcpDisconnectLocal = 1,
    TcpDisconnectRemote = 2,
    SslHandshakeOutgoing = 101,
    SslHandshakeIncoming = 102,
    SslInvalidServerCertificate = 103,
    SslServerCertificate = 104,
    SslException = 105,
    SslClientCertRequest = 106,
    HttpRequest = 200,
    HttpResponse = 201,
    HttpSkippedRequestComplete = 202,
    HttpSkippedResponseComplete = 203,
    Pop3MailIncoming = 300,
    SmtpMailOutgoing = 400,
    HttpsProxyRequest = 500,
    Socks4Request = 501,
    Socks5AuthRequest = 502,
    Socks5AuthUnpw = 503,
    Socks5Request = 504,
    RawOutgoing = 600,
    RawIncoming = 601,
    FtpCommand = 700,
    FtpResponse = 701,
    FtpDataOutgoing = 800,
    FtpDataIncoming = 801,
    FtpDataPartOutgoing = 802,
    FtpDataPartIncoming = 803,
    NntpArticle = 900,
    NntpPost = 901,
    IcqLogin = 1000,
    IcqRequest = 1001,
    IcqResponse = 1002,
    IcqChatMessageOutgoing = 1003,
    IcqChatMessageIncoming = 1004,
    XmppRequest = 1100,
    XmppResponse = 1101,
}

impl ObjectType {
    /// Every known object type.
    pub const ALL: [ObjectType; 37] = [
        Self::Null,
        Self::TcpDisconnectLocal,
        Self::TcpDisconnectRemote,
        Self::SslHandshakeOutgoing,
        Self::SslHandshakeIncoming,
        Self::SslInvalidServerCertificate,
        Self::SslServerCertificate,
        Self::SslException,
        Self::SslClientCertRequest,
        Self::HttpRequest,
        Self::HttpResponse,
        Self::HttpSkippedRequestComplete,
        Self::HttpSkippedResponseComplete,
        Self::Pop3MailIncoming,
        Self::SmtpMailOutgoing,
        Self::HttpsProxyRequest,
        Self::Socks4Request,
        Self::Socks5AuthRequest,
        Self::Socks5AuthUnpw,
        Self::Socks5Request,
        Self::RawOutgoing,
        Self::RawIncoming,
        Self::FtpCommand,
        Self::FtpResponse,
        Self::FtpDataOutgoing,
        Self::FtpDataIncoming,
        Self::FtpDataPartOutgoing,
        Self::FtpDataPartIncoming,
        Self::NntpArticle,
        Self::NntpPost,
        Self::IcqLogin,
        Self::IcqRequest,
        Self::IcqResponse,
        Self::IcqChatMessageOutgoing,
        Self::IcqChatMessageIncoming,
        Self::XmppRequest,
        Self::XmppResponse,
    ];

    /// Raw wire value.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Looks up the type for a raw wire value.
    pub fn from_raw(value: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_raw() == value)
    }

    /// Number of streams an object of this type carries when created fresh.
    pub fn stream_count(self) -> usize {
        match self {
            Self::HttpRequest | Self::HttpResponse => 3,
            Self::IcqChatMessageOutgoing | Self::IcqChatMessageIncoming => ImStream::COUNT,
            Self::SslServerCertificate => 3,
            _ => 1,
        }
    }

    /// Returns true for chat message types inspected by the IM rules.
    pub fn is_chat_message(self) -> bool {
        matches!(
            self,
            Self::IcqChatMessageOutgoing | Self::IcqChatMessageIncoming
        )
    }

    /// Returns true for HTTP request/response objects.
    pub fn is_http(self) -> bool {
        matches!(self, Self::HttpRequest | Self::HttpResponse)
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Stream indices of HTTP objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStream {
    /// Request or status line.
    Status = 0,
    /// Header block.
    Header = 1,
    /// Body.
    Content = 2,
}

impl From<HttpStream> for usize {
    fn from(s: HttpStream) -> usize {
        s as usize
    }
}

/// Stream indices of IM chat message objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImStream {
    Raw = 0,
    UserUin = 1,
    ContactUin = 2,
    TextFormat = 3,
    Text = 4,
}

impl ImStream {
    /// Number of streams in a chat message.
    pub const COUNT: usize = 5;
}

impl From<ImStream> for usize {
    fn from(s: ImStream) -> usize {
        s as usize
    }
}

/// Declared encoding of an IM chat message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImTextFormat {
    Ansi = 0,
    Utf8 = 1,
    Utf16 = 2,
    FileTransfer = 3,
}

impl ImTextFormat {
    /// Maps the raw tag carried in the text-format stream.
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Ansi),
            1 => Some(Self::Utf8),
            2 => Some(Self::Utf16),
            3 => Some(Self::FileTransfer),
            _ => None,
        }
    }
}

/// Header carrying the request line of the request a response answers.
pub const EXHDR_RESPONSE_REQUEST: &str = "X-EXHDR-REQUEST";

/// Header carrying the host of the request a response answers.
pub const EXHDR_RESPONSE_HOST: &str = "X-EXHDR-REQUEST-HOST";

/// One semantic unit of application-layer traffic.
///
/// The stream array is fixed at creation; index access beyond it is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolObject {
    object_type: ObjectType,
    streams: Vec<Stream>,
    read_only: bool,
}

impl ProtocolObject {
    /// Creates an empty object with the type's default stream count.
    pub fn new(object_type: ObjectType) -> Self {
        Self::with_streams(object_type, object_type.stream_count())
    }

    /// Creates an empty object with an explicit stream count.
    pub fn with_streams(object_type: ObjectType, count: usize) -> Self {
        Self {
            object_type,
            streams: vec![Stream::new(); count],
            read_only: false,
        }
    }

    /// Creates an object from already-populated streams.
    pub fn from_streams(object_type: ObjectType, streams: Vec<Stream>) -> Self {
        Self {
            object_type,
            streams,
            read_only: false,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Borrows the stream at `index`.
    pub fn stream(&self, index: impl Into<usize>) -> Result<&Stream> {
        let index = index.into();
        let count = self.streams.len();
        self.streams
            .get(index)
            .ok_or(FilterError::StreamIndex { index, count })
    }

    /// Mutably borrows the stream at `index`; fails on read-only objects.
    pub fn stream_mut(&mut self, index: impl Into<usize>) -> Result<&mut Stream> {
        if self.read_only {
            return Err(FilterError::ReadOnly);
        }
        let index = index.into();
        let count = self.streams.len();
        self.streams
            .get_mut(index)
            .ok_or(FilterError::StreamIndex { index, count })
    }

    /// All streams in declaration order.
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Rewinds every stream cursor. Allowed on read-only objects.
    pub fn rewind_all(&mut self) {
        for stream in &mut self.streams {
            stream.rewind();
        }
    }

    /// Produces an independent copy, rewound, keeping the read-only flag.
    pub fn detach(&self) -> Self {
        let mut copy = self.clone();
        copy.rewind_all();
        copy
    }

    /// Size of the stream at `index`, or 0 if it does not exist.
    pub fn stream_size(&self, index: impl Into<usize>) -> u64 {
        self.stream(index).map(Stream::size).unwrap_or(0)
    }
}
