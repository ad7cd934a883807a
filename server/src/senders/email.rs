//! SMTP email transport. Ported from
//! `original_source/notifier-service/email-sender/smtp.py`: skip silently
//! when unconfigured or recipient list is empty, send a multipart
//! plain+HTML message, swallow and log transport errors.

use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;

pub struct EmailSender {
    cfg: EmailConfig,
}

impl EmailSender {
    pub fn new(cfg: EmailConfig) -> Self {
        Self { cfg }
    }

    fn configured(&self) -> bool {
        !self.cfg.host.is_empty()
    }

    pub async fn send(&self, to: &[String], subject: &str, plain: &str, html: &str) {
        let recipients: Vec<&str> = to.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
        if recipients.is_empty() {
            tracing::debug!("no email recipients, skipping send");
            return;
        }
        if !self.configured() {
            tracing::debug!("smtp host not configured, skipping send to {:?}", recipients);
            return;
        }

        match self.build_message(&recipients, subject, plain, html) {
            Ok(message) => {
                if let Err(e) = self.dispatch(message).await {
                    tracing::warn!(?recipients, error = %e, "failed to send email");
                }
            }
            Err(e) => tracing::warn!(?recipients, error = %e, "failed to build email message"),
        }
    }

    fn build_message(
        &self,
        recipients: &[&str],
        subject: &str,
        plain: &str,
        html: &str,
    ) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
        let mut builder = Message::builder()
            .from(self.cfg.from_addr.parse::<Mailbox>()?)
            .subject(subject);
        for addr in recipients {
            builder = builder.to(addr.parse::<Mailbox>()?);
        }
        let body = MultiPart::alternative()
            .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(plain.to_string()))
            .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(html.to_string()));
        Ok(builder.multipart(body)?)
    }

    async fn dispatch(&self, message: Message) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // `ssl` (implicit TLS) and `tls` (STARTTLS) are independent knobs, as
        // in `smtp.py`'s `use_tls=smtp.ssl, start_tls=... smtp.tls`: ssl wins
        // when both are set, tls applies only when ssl is off.
        let mut builder = if self.cfg.ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.cfg.host)?
        } else if self.cfg.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.cfg.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.cfg.host)
        };
        builder = builder.port(self.cfg.port).timeout(Some(std::time::Duration::from_secs(self.cfg.timeout_sec)));
        if !self.cfg.user.is_empty() {
            builder = builder.credentials(Credentials::new(self.cfg.user.clone(), self.cfg.password.clone()));
        }
        let transport = builder.build();
        transport.send(message).await?;
        Ok(())
    }
}
