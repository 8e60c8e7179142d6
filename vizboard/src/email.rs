//! Email service for activation links and password reset codes.

use std::path::Path;
use std::time::Duration;

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use minijinja::{Environment, context};

use crate::config::{Config, EmailTransportConfig};
use crate::errors::Error;

const LAYOUT: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{{ subject }}</title>
    <style>
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
        .container { max-width: 600px; margin: 0 auto; padding: 20px; }
        .code { font-size: 28px; letter-spacing: 6px; font-weight: bold; }
        .footer { margin-top: 30px; font-size: 12px; color: #666; }
    </style>
</head>
<body>
    <div class="container">
        <h2>{{ subject }}</h2>
        <p>{% if name %}Hello {{ name }},{% else %}Hello,{% endif %}</p>
        {% block content %}{% endblock %}
        <div class="footer">
            <p>This is an automated message from {{ site_name }}, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#;

const ACTIVATION: &str = r#"{% extends "layout.html" %}
{% block content %}
        <p>Thanks for signing up for {{ site_name }}. Confirm your email address to activate your account:</p>
        <p><a href="{{ link }}">Activate your account</a></p>
        <p>Or copy and paste this link into your browser:</p>
        <p>{{ link }}</p>
        <p>This link expires in {{ expires_in }}.</p>
{% endblock %}"#;

const PASSWORD_RESET: &str = r#"{% extends "layout.html" %}
{% block content %}
        <p>We received a request to reset your password. If you didn't make this request, you can safely ignore this email.</p>
        <p>Your verification code is:</p>
        <p class="code">{{ code }}</p>
        <p>The code expires in {{ expires_in }}.</p>
{% endblock %}"#;

pub struct EmailService {
    transport: EmailTransport,
    templates: Environment<'static>,
    from_email: String,
    from_name: String,
    base_url: String,
    site_name: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

fn template_error(e: minijinja::Error) -> Error {
    Error::Internal {
        operation: format!("render email template: {e}"),
    }
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        let mut templates = Environment::new();
        templates.add_template("layout.html", LAYOUT).map_err(template_error)?;
        templates.add_template("activation.html", ACTIVATION).map_err(template_error)?;
        templates.add_template("password_reset.html", PASSWORD_RESET).map_err(template_error)?;

        Ok(Self {
            transport,
            templates,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            site_name: config.metadata.site_name.clone(),
        })
    }

    pub fn activation_link(&self, token: &str) -> String {
        format!("{}/activation?token={}", self.base_url, token)
    }

    pub async fn send_activation_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        token: &str,
        expires_in: Duration,
    ) -> Result<(), Error> {
        let subject = format!("Activate your {} account", self.site_name);
        let body = self.render(
            "activation.html",
            context! {
                subject => &subject,
                name => to_name,
                site_name => &self.site_name,
                link => self.activation_link(token),
                expires_in => humantime::format_duration(expires_in).to_string(),
            },
        )?;

        self.send_email(to_email, to_name, &subject, &body).await
    }

    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        verify_code: &str,
        expires_in: Duration,
    ) -> Result<(), Error> {
        let subject = "Password Reset Request".to_string();
        let body = self.render(
            "password_reset.html",
            context! {
                subject => &subject,
                name => to_name,
                site_name => &self.site_name,
                code => verify_code,
                expires_in => humantime::format_duration(expires_in).to_string(),
            },
        )?;

        self.send_email(to_email, to_name, &subject, &body).await
    }

    fn render(&self, template: &str, ctx: minijinja::Value) -> Result<String, Error> {
        self.templates
            .get_template(template)
            .and_then(|t| t.render(ctx))
            .map_err(template_error)
    }

    async fn send_email(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = match to_name {
            Some(name) => format!("{name} <{to_email}>"),
            None => to_email.to_string(),
        }
        .parse::<Mailbox>()
        .map_err(|e| Error::BadRequest {
            message: format!("Invalid email address: {e}"),
        })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        tracing::debug!(subject, "Email sent");
        Ok(())
    }
}
