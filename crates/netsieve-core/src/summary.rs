//! One-line descriptions of protocol objects for listings and notifications.

use serde::{Deserialize, Serialize};

use crate::inspector::http::derive_url;
use crate::object::{HttpStream, ImStream, ObjectType, ProtocolObject};
use crate::text::decode_utf8;

/// Protocol family an object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Http,
    Mail,
    Ftp,
    Im,
    Raw,
    Xmpp,
    Other,
}

impl Category {
    pub fn of(object_type: ObjectType) -> Self {
        use ObjectType::*;
        match object_type {
            HttpRequest | HttpResponse | HttpSkippedRequestComplete | HttpSkippedResponseComplete => {
                Self::Http
            }
            Pop3MailIncoming | SmtpMailOutgoing | NntpArticle | NntpPost => Self::Mail,
            FtpCommand | FtpResponse | FtpDataOutgoing | FtpDataIncoming | FtpDataPartOutgoing
            | FtpDataPartIncoming => Self::Ftp,
            IcqLogin | IcqRequest | IcqResponse | IcqChatMessageOutgoing
            | IcqChatMessageIncoming => Self::Im,
            RawOutgoing | RawIncoming => Self::Raw,
            XmppRequest | XmppResponse => Self::Xmpp,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Http => "HTTP",
            Self::Mail => "Mail",
            Self::Ftp => "FTP",
            Self::Im => "IM",
            Self::Raw => "Raw",
            Self::Xmpp => "XMPP",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}

fn label(object_type: ObjectType) -> &'static str {
    use ObjectType::*;
    match object_type {
        HttpRequest | XmppRequest | IcqRequest => "Request",
        HttpResponse | XmppResponse | IcqResponse => "Response",
        HttpSkippedRequestComplete => "Skipped request",
        HttpSkippedResponseComplete => "Skipped response",
        Pop3MailIncoming => "Incoming mail",
        SmtpMailOutgoing => "Outgoing mail",
        NntpArticle => "Article",
        NntpPost => "Post",
        FtpCommand => "Command",
        FtpResponse => "Reply",
        FtpDataOutgoing => "Outgoing data",
        FtpDataIncoming => "Incoming data",
        FtpDataPartOutgoing => "Outgoing data part",
        FtpDataPartIncoming => "Incoming data part",
        IcqLogin => "Login",
        IcqChatMessageOutgoing => "Outgoing message",
        IcqChatMessageIncoming => "Incoming message",
        RawOutgoing => "Outgoing",
        RawIncoming => "Incoming",
        TcpDisconnectLocal => "Local disconnect",
        TcpDisconnectRemote => "Remote disconnect",
        SslHandshakeOutgoing | SslHandshakeIncoming => "TLS handshake",
        SslInvalidServerCertificate => "Invalid server certificate",
        SslServerCertificate => "Server certificate",
        SslException => "TLS exception",
        SslClientCertRequest => "Client certificate request",
        HttpsProxyRequest | Socks4Request | Socks5AuthRequest | Socks5AuthUnpw | Socks5Request => {
            "Proxy request"
        }
        Null => "Empty",
    }
}

/// Presentation-ready description of a protocol object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub object_type: ObjectType,
    pub category: Category,
    pub label: String,
    /// First line of an HTTP object, without the line break.
    pub status_line: Option<String>,
    /// Derived URL of an HTTP object.
    pub url: Option<String>,
    /// Size of the primary payload stream in bytes.
    pub size: u64,
}

impl ObjectSummary {
    pub fn of(object: &ProtocolObject) -> Self {
        let object_type = object.object_type();

        let (status_line, url, size) = if object_type.is_http() {
            let status = object
                .stream(HttpStream::Status)
                .map(|s| decode_utf8(s.as_bytes()).trim_end().to_string())
                .ok()
                .filter(|s| !s.is_empty());
            let url = Some(derive_url(object)).filter(|u| !u.is_empty());
            (status, url, object.stream_size(HttpStream::Content))
        } else if object_type.is_chat_message() {
            (None, None, object.stream_size(ImStream::Text))
        } else {
            (None, None, object.stream_size(0usize))
        };

        Self {
            object_type,
            category: Category::of(object_type),
            label: label(object_type).to_string(),
            status_line,
            url,
            size,
        }
    }
}

impl std::fmt::Display for ObjectSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.category, self.label)?;
        if let Some(url) = &self.url {
            write!(f, " {}", url)?;
        } else if let Some(status) = &self.status_line {
            write!(f, " {}", status)?;
        }
        write!(f, " ({} bytes)", self.size)
    }
}
