use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::{signal, sync::watch};

use mde_pki::CaIdentity;
use mde_protocol::wap::{AuthType, ManagementEndpoint, PollSchedule};

use crate::server::{
    AppState, CertificateSink, DirectorySink, LogSink, ServerConfig, TokenAuthority,
};

#[derive(Parser, Debug)]
pub struct ServeCommand {
    /// HTTP server port
    #[arg(short, long, env = "MDE_PORT", default_value = "8000")]
    pub port: u16,

    /// Public base URL of the enrollment services
    #[arg(long, env = "MDE_ENROLLMENT_URL", default_value = "https://enterpriseenrollment.example.com")]
    pub enrollment_url: String,

    /// Public base URL of the management server
    #[arg(long, env = "MDE_MANAGE_URL", default_value = "https://manage.example.com")]
    pub manage_url: String,

    /// PEM certificate of the issuing CA
    #[arg(long, env = "MDE_CA_CERT")]
    pub ca_cert: PathBuf,

    /// PEM private key of the issuing CA (PKCS#8 or PKCS#1)
    #[arg(long, env = "MDE_CA_KEY")]
    pub ca_key: PathBuf,

    /// Secret used to sign federation tokens
    #[arg(long, env = "MDE_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: String,

    /// Provider id written into the management client configuration
    #[arg(long, env = "MDE_PROVIDER_ID", default_value = "DEMO MDM")]
    pub provider_id: String,

    /// Display name of the management server
    #[arg(long, env = "MDE_SERVER_NAME", default_value = "Windows MDM Demo Server")]
    pub server_name: String,

    /// Authentication the management client and server use with each other
    #[arg(long, env = "MDE_AUTH_TYPE", value_enum, default_value_t = AuthTypeArg::Digest)]
    pub auth_type: AuthTypeArg,

    /// Identifier of the certificate enrollment policy
    #[arg(long, env = "MDE_POLICY_ID", default_value = "mattrax-identity")]
    pub policy_id: String,

    /// Directory issued certificates are written to (logged only when unset)
    #[arg(long, env = "MDE_CERT_DIR")]
    pub cert_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "MDE_LOG_JSON")]
    pub log_json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthTypeArg {
    Basic,
    Digest,
}

impl From<AuthTypeArg> for AuthType {
    fn from(arg: AuthTypeArg) -> Self {
        match arg {
            AuthTypeArg::Basic => Self::Basic,
            AuthTypeArg::Digest => Self::Digest,
        }
    }
}

impl ServeCommand {
    fn config(&self) -> ServerConfig {
        let enrollment_url = self.enrollment_url.trim_end_matches('/').to_string();
        let manage_url = self.manage_url.trim_end_matches('/');
        ServerConfig {
            enrollment_url,
            management: ManagementEndpoint {
                address: format!("{manage_url}/ManagementServer/Manage.svc"),
                provider_id: self.provider_id.clone(),
                server_name: self.server_name.clone(),
                auth_type: self.auth_type.into(),
                poll: PollSchedule::default(),
            },
            policy_id: self.policy_id.clone(),
            policy_name: format!("{} Identity Certificate Policy", self.server_name),
        }
    }

    pub async fn run(self) -> Result<()> {
        super::init_tracing(self.log_json);

        let ca = CaIdentity::load(&self.ca_cert, &self.ca_key)
            .with_context(|| format!("loading CA from {}", self.ca_cert.display()))?;
        tracing::info!(
            subject = %ca.subject(),
            fingerprint = ca.fingerprint(),
            "loaded certificate authority"
        );

        let sink: Arc<dyn CertificateSink> = match &self.cert_dir {
            Some(dir) => Arc::new(DirectorySink::create(dir)?),
            None => Arc::new(LogSink),
        };

        let state = AppState {
            config: Arc::new(self.config()),
            ca: Arc::new(ca),
            tokens: Arc::new(TokenAuthority::new(
                self.token_secret.as_bytes(),
                &self.enrollment_url,
            )),
            sink,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!(%addr, enrollment_url = %state.config.enrollment_url, "listening");

        let server_handle = tokio::spawn(async move {
            if let Err(e) = crate::server::run_server(addr, state, shutdown_rx).await {
                tracing::error!(error = %e, "server stopped");
            }
        });

        signal::ctrl_c().await?;
        tracing::info!("shutting down");
        let _ = shutdown_tx.send(true);
        let _ = server_handle.await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_service_urls_from_flags() {
        let cmd = ServeCommand::parse_from([
            "serve",
            "--ca-cert",
            "ca.pem",
            "--ca-key",
            "ca.key",
            "--token-secret",
            "secret",
            "--enrollment-url",
            "https://enroll.example.com/",
            "--manage-url",
            "https://mdm.example.com/",
        ]);
        assert_eq!(cmd.port, 8000);
        assert!(!cmd.log_json);

        let config = cmd.config();
        assert_eq!(
            config.service_url("Policy.svc"),
            "https://enroll.example.com/EnrollmentServer/Policy.svc"
        );
        assert_eq!(
            config.management.address,
            "https://mdm.example.com/ManagementServer/Manage.svc"
        );
        assert_eq!(config.management.provider_id, "DEMO MDM");
        assert_eq!(config.policy_id, "mattrax-identity");
        assert_eq!(config.management.auth_type, AuthType::Digest);
    }

    #[test]
    fn auth_type_flag_selects_basic() {
        let cmd = ServeCommand::parse_from([
            "serve",
            "--ca-cert",
            "ca.pem",
            "--ca-key",
            "ca.key",
            "--token-secret",
            "secret",
            "--auth-type",
            "basic",
        ]);
        assert_eq!(cmd.config().management.auth_type, AuthType::Basic);
    }
}
