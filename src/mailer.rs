//! Outbound mail: message assembly, SMTP transport, and the dispatcher
//! that turns per-send failures into a success flag.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use tracing::{error, info};

use crate::config::SmtpConfig;
use crate::error::{ConfigError, DeliveryError};

// ── Outgoing mail ───────────────────────────────────────────────────

/// A binary part attached to an outgoing mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
    /// When set, the part is inline and referenced from the HTML as `cid:<id>`.
    pub content_id: Option<String>,
}

impl MailAttachment {
    /// Inline part addressed by content id.
    pub fn inline(content_id: &str, filename: &str, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            body,
            content_id: Some(content_id.to_string()),
        }
    }

    /// Regular downloadable attachment.
    pub fn file(filename: &str, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            body,
            content_id: None,
        }
    }

    fn to_part(&self) -> Result<SinglePart, DeliveryError> {
        let content_type = ContentType::parse(&self.content_type)
            .map_err(|e| DeliveryError::Build(format!("{}: {e}", self.content_type)))?;
        let attachment = match &self.content_id {
            Some(cid) => Attachment::new_inline(cid.clone()),
            None => Attachment::new(self.filename.clone()),
        };
        Ok(attachment.body(self.body.clone(), content_type))
    }
}

/// One mail ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<MailAttachment>,
}

impl OutgoingMail {
    pub fn attachment(&self, filename: &str) -> Option<&MailAttachment> {
        self.attachments.iter().find(|a| a.filename == filename)
    }
}

/// Assemble a MIME message.
///
/// The HTML and its inline parts form a `multipart/related` body; regular
/// attachments wrap that in `multipart/mixed`.
pub fn build_message(from: &str, mail: &OutgoingMail) -> Result<Message, DeliveryError> {
    let from: Mailbox = from.parse().map_err(|e| DeliveryError::InvalidAddress {
        address: from.to_string(),
        reason: format!("{e}"),
    })?;
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|e| DeliveryError::InvalidAddress {
            address: mail.to.clone(),
            reason: format!("{e}"),
        })?;

    let (inline, files): (Vec<&MailAttachment>, Vec<&MailAttachment>) = mail
        .attachments
        .iter()
        .partition(|a| a.content_id.is_some());

    let mut related = MultiPart::related().singlepart(SinglePart::html(mail.html.clone()));
    for part in inline {
        related = related.singlepart(part.to_part()?);
    }

    let body = if files.is_empty() {
        related
    } else {
        let mut mixed = MultiPart::mixed().multipart(related);
        for part in files {
            mixed = mixed.singlepart(part.to_part()?);
        }
        mixed
    };

    Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.clone())
        .multipart(body)
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

// ── Mailer trait ────────────────────────────────────────────────────

/// Outbound mail relay.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// One-time credential handshake before the batch starts.
    async fn verify(&self) -> Result<(), ConfigError>;

    /// Deliver one mail.
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError>;
}

/// SMTP relay via lettre, STARTTLS on the submission port.
///
/// The transport pools its connection, so one `SmtpMailer` serves the whole
/// batch without re-authenticating per mail.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    host: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, ConfigError> {
        let tls = TlsParameters::builder(config.host.clone())
            .dangerous_accept_invalid_certs(config.accept_invalid_certs)
            .build_rustls()
            .map_err(|e| ConfigError::InvalidValue {
                key: "SMTP_HOST".into(),
                message: format!("TLS setup failed: {e}"),
            })?;

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(Tls::Required(tls))
            .credentials(creds)
            .build();

        if config.accept_invalid_certs {
            tracing::warn!(host = %config.host, "SMTP certificate validation is disabled");
        }

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
            host: config.host.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn verify(&self) -> Result<(), ConfigError> {
        match self.transport.test_connection().await {
            Ok(true) => {
                info!(host = %self.host, "Email configuration verified successfully");
                Ok(())
            }
            Ok(false) => Err(ConfigError::Relay(format!(
                "{} did not accept the connection test",
                self.host
            ))),
            Err(e) => Err(ConfigError::Relay(e.to_string())),
        }
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        let message = build_message(&self.from_address, mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| DeliveryError::Relay(e.to_string()))?;
        Ok(())
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────

/// Send call site: delivery errors end here as a `false` outcome.
#[derive(Clone)]
pub struct Dispatcher {
    mailer: Arc<dyn Mailer>,
}

impl Dispatcher {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    pub async fn verify(&self) -> Result<(), ConfigError> {
        self.mailer.verify().await
    }

    /// Deliver `mail`, returning whether the relay accepted it.
    pub async fn deliver(&self, mail: &OutgoingMail) -> bool {
        match self.mailer.send(mail).await {
            Ok(()) => {
                info!(to = %mail.to, "Pass sent successfully");
                true
            }
            Err(e) => {
                error!(to = %mail.to, error = %e, "Error sending pass");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    fn mail(attachments: Vec<MailAttachment>) -> OutgoingMail {
        OutgoingMail {
            to: "asha@example.com".into(),
            subject: "Your pass".into(),
            html: "<p>hello</p>".into(),
            attachments,
        }
    }

    fn formatted(message: &Message) -> String {
        String::from_utf8_lossy(&message.formatted()).into_owned()
    }

    #[test]
    fn inline_parts_use_related_with_content_ids() {
        let m = mail(vec![
            MailAttachment::inline("barcodeImage", "barcode.png", "image/png", vec![1, 2, 3]),
            MailAttachment::inline("headerImage", "header.png", "image/png", vec![4, 5, 6]),
        ]);
        let text = formatted(&build_message("events@example.com", &m).unwrap());
        assert!(text.contains("multipart/related"));
        assert!(!text.contains("multipart/mixed"));
        assert!(text.contains("Content-ID: <barcodeImage>"));
        assert!(text.contains("Content-ID: <headerImage>"));
        assert!(text.contains("Subject: Your pass"));
        assert!(text.contains("To: asha@example.com"));
    }

    #[test]
    fn file_attachment_uses_mixed() {
        let m = mail(vec![MailAttachment::file(
            "pass.pdf",
            "application/pdf",
            b"%PDF-1.4".to_vec(),
        )]);
        let text = formatted(&build_message("events@example.com", &m).unwrap());
        assert!(text.contains("multipart/mixed"));
        assert!(text.contains("application/pdf"));
        assert!(text.contains("pass.pdf"));
    }

    #[test]
    fn invalid_recipient_is_delivery_error() {
        let mut m = mail(vec![]);
        m.to = "not an address".into();
        let err = build_message("events@example.com", &m).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { ref address, .. } if address == "not an address"));
    }

    #[test]
    fn invalid_content_type_is_build_error() {
        let m = mail(vec![MailAttachment::file("x", "not a type", vec![])]);
        assert!(matches!(
            build_message("events@example.com", &m),
            Err(DeliveryError::Build(_))
        ));
    }

    #[test]
    fn attachment_lookup_by_filename() {
        let m = mail(vec![MailAttachment::file("pass.pdf", "application/pdf", vec![1])]);
        assert!(m.attachment("pass.pdf").is_some());
        assert!(m.attachment("barcode.png").is_none());
    }

    struct FlakyMailer {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn verify(&self) -> Result<(), ConfigError> {
            Ok(())
        }

        async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(mail.to.clone());
            if mail.to.starts_with("bounce") {
                return Err(DeliveryError::Relay("550 mailbox unavailable".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatcher_converts_errors_to_false() {
        let mailer = Arc::new(FlakyMailer {
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = Dispatcher::new(mailer.clone());

        let mut bad = mail(vec![]);
        bad.to = "bounce@example.com".into();
        assert!(!dispatcher.deliver(&bad).await);
        assert!(dispatcher.deliver(&mail(vec![])).await);

        assert_eq!(
            *mailer.sent.lock().unwrap(),
            vec!["bounce@example.com".to_string(), "asha@example.com".to_string()]
        );
    }

    // ── Relay session reuse ─────────────────────────────────────────

    /// Minimal plaintext SMTP responder. Returns its port and a counter of
    /// accepted TCP connections.
    async fn fake_relay() -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_session(stream));
            }
        });

        (port, accepted)
    }

    async fn serve_session(stream: TcpStream) {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        if write.write_all(b"220 localhost ESMTP\r\n").await.is_err() {
            return;
        }

        while let Ok(Some(line)) = lines.next_line().await {
            let verb = line.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
            let reply: &[u8] = match verb.as_str() {
                "EHLO" | "HELO" => b"250-localhost\r\n250 8BITMIME\r\n",
                "DATA" => {
                    if write.write_all(b"354 go ahead\r\n").await.is_err() {
                        return;
                    }
                    while let Ok(Some(body)) = lines.next_line().await {
                        if body == "." {
                            break;
                        }
                    }
                    b"250 queued\r\n"
                }
                "QUIT" => {
                    let _ = write.write_all(b"221 bye\r\n").await;
                    return;
                }
                _ => b"250 OK\r\n",
            };
            if write.write_all(reply).await.is_err() {
                return;
            }
        }
    }

    #[tokio::test]
    async fn relay_session_is_reused_across_sends() {
        let (port, accepted) = fake_relay().await;
        let mailer = SmtpMailer {
            transport: AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("127.0.0.1")
                .port(port)
                .tls(Tls::None)
                .build(),
            from_address: "events@example.com".into(),
            host: "127.0.0.1".into(),
        };

        mailer.verify().await.unwrap();
        for _ in 0..3 {
            // Let the released connection return to the pool.
            tokio::time::sleep(Duration::from_millis(50)).await;
            mailer.send(&mail(vec![])).await.unwrap();
        }

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }
}
