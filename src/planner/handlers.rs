//! Per-kind apply handlers.
//!
//! Every handler is idempotent: running it twice against the same target
//! leaves the target in the same state.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{
    Certificate, Config, EngineSettings, FlatRecord, SecretResolver, Server,
};
use crate::error::{ApplyError, ProviderError, Result};
use crate::providers::{CertificateIssuer, DnsProviders, IssuedCertificate};
use crate::remote::{RemoteSession, shell_quote};
use crate::state::CertificateRecord;

use super::plan::{Change, ChangeType, EntityState};

/// Everything handlers need besides a session.
pub(crate) struct ApplyContext {
    pub settings: EngineSettings,
    pub config: Config,
    pub resolver: SecretResolver,
    pub providers: DnsProviders,
    pub issuer: Option<Arc<dyn CertificateIssuer>>,
}

/// What a handler did.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub output: String,
    pub certificate: Option<CertificateRecord>,
}

impl From<String> for Outcome {
    fn from(output: String) -> Self {
        Self {
            output,
            certificate: None,
        }
    }
}

fn missing_payload(change: &Change) -> ApplyError {
    ApplyError::MissingPayload {
        kind: change.kind.to_string(),
        name: change.name.clone(),
    }
}

impl ApplyContext {
    async fn run(&self, session: &dyn RemoteSession, command: &str) -> Result<String> {
        let output = self
            .settings
            .retry
            .run(command, || session.run(command))
            .await?;
        Ok(output.stdout)
    }

    /// Uploads the artifacts of a deployment and starts it.
    pub async fn deploy(&self, session: &dyn RemoteSession, change: &Change) -> Result<Outcome> {
        let server = change
            .server
            .as_deref()
            .ok_or_else(|| ApplyError::UnresolvedServer {
                kind: change.kind.to_string(),
                name: change.name.clone(),
            })?;
        let gateway = match &change.new {
            Some(EntityState::Service(_)) => false,
            Some(EntityState::InfraService(infra)) => infra.is_gateway(),
            Some(EntityState::Gateway(_)) => true,
            _ => return Err(missing_payload(change).into()),
        };

        let artifacts = self.settings.artifacts(server, &change.name, gateway);
        if let Some((missing, _)) = artifacts.iter().find(|(local, _)| !local.is_file()) {
            return Err(ApplyError::MissingArtifact {
                path: missing.clone(),
            }
            .into());
        }

        let dir = self.settings.remote_dir(&change.name);
        self.settings
            .retry
            .run(&format!("mkdir {dir}"), || session.mkdir_all(&dir))
            .await?;
        for (local, remote_file) in &artifacts {
            let remote = format!("{dir}/{remote_file}");
            self.settings
                .retry
                .run(&format!("upload {remote}"), || session.upload_file(local, &remote))
                .await?;
        }

        let project = self.settings.project_name(&change.name);
        let compose_file = format!("{dir}/{}", artifacts[0].1);
        let output = self
            .run(
                session,
                &format!(
                    "docker compose -p {} -f {} up -d",
                    shell_quote(&project),
                    shell_quote(&compose_file)
                ),
            )
            .await?;
        info!("Deployed {} {} on {server}", change.kind, change.name);
        Ok(Outcome::from(output))
    }

    /// Stops a deployment and removes its directory.
    ///
    /// Stopping is best effort; only a failed removal fails the change.
    pub async fn remove(&self, session: &dyn RemoteSession, change: &Change) -> Result<Outcome> {
        let project = self.settings.project_name(&change.name);
        let dir = self.settings.remote_dir(&change.name);

        let mut output = String::new();
        match session
            .run(&format!("docker compose -p {} down", shell_quote(&project)))
            .await
        {
            Ok(out) => output.push_str(&out.stdout),
            Err(e) => warn!("Stopping {project} failed, removing anyway: {e}"),
        }
        output.push_str(&self.run(session, &format!("rm -rf {}", shell_quote(&dir))).await?);
        info!("Removed {} {}", change.kind, change.name);
        Ok(Outcome::from(output))
    }

    /// Configures the APT mirror and registry logins of a server.
    pub async fn prepare_server(&self, session: &dyn RemoteSession, server: &Server) -> Result<Outcome> {
        let mut done = Vec::new();

        self.settings
            .retry
            .run("mkdir base dir", || session.mkdir_all(&self.settings.remote_base_dir))
            .await?;

        if let Some(mirror) = &server.environment.apt_mirror {
            let url = mirror.url();
            let script = format!(
                "if [ -f /etc/apt/sources.list ]; then sed -i -E {} /etc/apt/sources.list; fi",
                shell_quote(&format!(r"s#https?://[^/ ]+/(ubuntu|debian)#{url}/\1#g"))
            );
            self.run(session, &script).await?;
            done.push(format!("apt mirror set to {url}"));
        }

        for name in &server.environment.registries {
            let registry = self
                .config
                .registry(name)
                .ok_or_else(|| ApplyError::MissingEntity {
                    kind: String::from("registry"),
                    name: name.clone(),
                })?;
            let password = self.resolver.resolve(&registry.password)?;
            self.registry_login(session, &registry.url, &registry.username, &password)
                .await?;
            done.push(format!("logged in to {}", registry.url));
        }

        Ok(Outcome::from(done.join("\n")))
    }

    /// Runs `docker login` with the password piped from an uploaded file.
    async fn registry_login(
        &self,
        session: &dyn RemoteSession,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let mut local = tempfile::NamedTempFile::new()?;
        local.write_all(password.as_bytes())?;
        local.flush()?;

        let remote = format!("/tmp/yo-login-{}", uuid::Uuid::new_v4().simple());
        session.upload_file(local.path(), &remote).await?;
        let login = self
            .run(
                session,
                &format!(
                    "docker login {} -u {} --password-stdin < {}",
                    shell_quote(url),
                    shell_quote(username),
                    shell_quote(&remote)
                ),
            )
            .await;
        if let Err(e) = session.run(&format!("rm -f {}", shell_quote(&remote))).await {
            warn!("Could not remove {remote}: {e}");
        }
        login.map(|_| ())
    }

    /// Creates, updates or deletes a DNS record through its domain's provider.
    pub async fn apply_record(&self, change: &Change) -> Result<Outcome> {
        let payload = if change.change_type == ChangeType::Delete {
            &change.old
        } else {
            &change.new
        };
        let Some(EntityState::DnsRecord(FlatRecord { domain, record })) = payload else {
            return Err(missing_payload(change).into());
        };

        let isp = self
            .config
            .domain(domain)
            .ok_or_else(|| ApplyError::MissingEntity {
                kind: String::from("domain"),
                name: domain.clone(),
            })?
            .dns_isp
            .as_str();
        let provider = self.providers.get(isp)?;

        let retry = &self.settings.retry;
        let verb = match change.change_type {
            ChangeType::Create => {
                retry
                    .run(&change.name, || provider.create_record(domain, record))
                    .await?;
                "created"
            }
            ChangeType::Update => {
                retry
                    .run(&change.name, || provider.update_record(domain, record))
                    .await?;
                "updated"
            }
            ChangeType::Delete => {
                retry
                    .run(&change.name, || provider.delete_record(domain, record))
                    .await?;
                "deleted"
            }
            ChangeType::Noop => "kept",
        };
        Ok(Outcome::from(format!("{verb} {} via {}", change.name, provider.name())))
    }

    /// Checks that the domain's provider hosts the domain.
    pub async fn verify_domain(&self, change: &Change) -> Result<Outcome> {
        if change.change_type == ChangeType::Delete {
            return Ok(Outcome::from(format!("forgot domain {}", change.name)));
        }
        let Some(EntityState::Domain(domain)) = &change.new else {
            return Err(missing_payload(change).into());
        };
        if !self.providers.contains(&domain.dns_isp) {
            return Ok(Outcome::from(format!("recorded domain {}", domain.name)));
        }

        let provider = self.providers.get(&domain.dns_isp)?;
        let hosted = self
            .settings
            .retry
            .run(&format!("list domains of {}", domain.dns_isp), || {
                provider.list_domains()
            })
            .await?;
        if hosted.iter().any(|d| d == &domain.name) {
            Ok(Outcome::from(format!(
                "domain {} is hosted by {}",
                domain.name,
                provider.name()
            )))
        } else {
            Err(ProviderError::api(
                provider.name(),
                404,
                format!("domain {} is not hosted by this account", domain.name),
            )
            .into())
        }
    }

    /// Obtains, renews or removes a certificate.
    pub async fn apply_certificate(&self, change: &Change) -> Result<Outcome> {
        let dir = self.settings.certificate_dir();
        if change.change_type == ChangeType::Delete {
            for ext in ["crt", "key"] {
                let path = dir.join(format!("{}.{ext}", change.name));
                if path.exists() {
                    tokio::fs::remove_file(&path).await?;
                }
            }
            return Ok(Outcome::from(format!("removed certificate {}", change.name)));
        }

        let Some(EntityState::Certificate(cert)) = &change.new else {
            return Err(missing_payload(change).into());
        };
        let issuer = self.issuer.as_ref().ok_or_else(|| ProviderError::Issuance {
            message: String::from("no certificate issuer configured"),
        })?;

        let current = match &change.old {
            Some(EntityState::Issued(known)) if change.change_type == ChangeType::Update => {
                load_certificate(&dir, cert, known).await
            }
            _ => None,
        };
        let issued = match current {
            Some(current) => issuer.renew_certificate(&current).await?,
            None => issuer.obtain_certificate(&cert.domains).await?,
        };

        write_certificate(&dir, &cert.name, &issued).await?;
        info!(
            "Certificate {} valid until {}",
            cert.name,
            issued.not_after.to_rfc3339()
        );
        Ok(Outcome {
            output: format!("issued {} for {}", cert.name, issued.domains.join(", ")),
            certificate: Some(CertificateRecord {
                domains: issued.domains,
                not_after: Some(issued.not_after),
            }),
        })
    }
}

async fn load_certificate(
    dir: &Path,
    cert: &Certificate,
    known: &CertificateRecord,
) -> Option<IssuedCertificate> {
    let certificate_pem = tokio::fs::read_to_string(dir.join(format!("{}.crt", cert.name)))
        .await
        .ok()?;
    let private_key_pem = tokio::fs::read_to_string(dir.join(format!("{}.key", cert.name)))
        .await
        .ok()?;
    let Some(not_after) = known.not_after else {
        debug!("No expiry known for {}, obtaining a new certificate", cert.name);
        return None;
    };
    Some(IssuedCertificate {
        domains: cert.domains.clone(),
        certificate_pem,
        private_key_pem,
        not_after,
    })
}

async fn write_certificate(dir: &Path, name: &str, issued: &IssuedCertificate) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(format!("{name}.crt")), &issued.certificate_pem).await?;

    let key_path = dir.join(format!("{name}.key"));
    tokio::fs::write(&key_path, &issued.private_key_pem).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}
