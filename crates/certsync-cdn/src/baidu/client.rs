//! Baidu Cloud certificate service + CDN client

use async_trait::async_trait;
use certsync_core::config::{CdnOptions, OriginPeer};
use certsync_core::UtcDateTime;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::auth::{canonical_uri, BaiduCredentials, BceSigner};
use crate::errors::CdnError;
use crate::traits::{CdnTarget, RemoteCertificateMeta};

pub const PLATFORM: &str = "baidu";
pub const CERTIFICATE_ENDPOINT: &str = "https://certificate.baidubce.com";
pub const CDN_ENDPOINT: &str = "https://cdn.baidubce.com";

/// Certificate service response structures
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertListResponse {
    #[serde(default)]
    certs: Vec<CertDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertDetail {
    cert_id: String,
    #[serde(default)]
    cert_common_name: String,
    #[serde(default)]
    cert_start_time: Option<String>,
    #[serde(default)]
    cert_stop_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCertResponse {
    cert_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidDomainResponse {
    is_valid: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

fn parse_time(value: &str) -> Option<UtcDateTime> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn origin_json(origin: &[OriginPeer]) -> Value {
    Value::Array(
        origin
            .iter()
            .map(|peer| {
                let mut entry = json!({
                    "peer": peer.peer,
                    "backup": peer.backup,
                    "follow302": peer.follow302,
                });
                if let Some(host) = &peer.host {
                    entry["host"] = json!(host);
                }
                if let Some(weight) = peer.weight {
                    entry["weight"] = json!(weight);
                }
                if let Some(isp) = &peer.isp {
                    entry["isp"] = json!(isp);
                }
                entry
            })
            .collect(),
    )
}

/// Baidu Cloud CDN target
pub struct BaiduCdnClient {
    client: Client,
    signer: BceSigner,
    certificate_endpoint: String,
    cdn_endpoint: String,
}

impl BaiduCdnClient {
    pub fn new(credentials: BaiduCredentials) -> Result<Self, CdnError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CdnError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            signer: BceSigner::new(credentials),
            certificate_endpoint: CERTIFICATE_ENDPOINT.to_string(),
            cdn_endpoint: CDN_ENDPOINT.to_string(),
        })
    }

    pub fn from_env() -> Result<Self, CdnError> {
        Self::new(BaiduCredentials::from_env()?)
    }

    /// Point both services somewhere else, e.g. a mock server
    pub fn with_endpoints(
        mut self,
        certificate_endpoint: impl Into<String>,
        cdn_endpoint: impl Into<String>,
    ) -> Self {
        self.certificate_endpoint = certificate_endpoint.into();
        self.cdn_endpoint = cdn_endpoint.into();
        self
    }

    /// Send a signed request and return the raw response body
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<String, CdnError> {
        let base = reqwest::Url::parse(endpoint)
            .map_err(|e| CdnError::Request(format!("Invalid endpoint {}: {}", endpoint, e)))?;
        let host = match (base.host_str(), base.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(CdnError::Request(format!("Endpoint {} has no host", endpoint)))
            }
        };

        let mut url = format!("{}{}", endpoint.trim_end_matches('/'), canonical_uri(path));
        if !query.is_empty() {
            let pairs: Vec<String> = query
                .iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        k.to_string()
                    } else {
                        format!("{}={}", k, urlencoding::encode(v))
                    }
                })
                .collect();
            url.push('?');
            url.push_str(&pairs.join("&"));
        }

        let content_type = "application/json;charset=utf-8";
        let now = Utc::now();
        let bce_date = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let authorization = self.signer.sign(
            method.as_str(),
            path,
            query,
            &[
                ("host", host.as_str()),
                ("content-type", content_type),
                ("x-bce-date", bce_date.as_str()),
            ],
            now,
        )?;

        debug!("Baidu API request: {} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("Content-Type", content_type)
            .header("x-bce-date", bce_date)
            .header("Authorization", authorization);
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let error: ApiErrorBody = serde_json::from_str(&text).unwrap_or_default();
            return Err(CdnError::remote(
                PLATFORM,
                format!(
                    "{} {} returned {}: {} {}",
                    method, path, status, error.code, error.message
                ),
            ));
        }
        Ok(text)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<T, CdnError> {
        let text = self.send(method, endpoint, path, query, body).await?;
        serde_json::from_str(&text).map_err(|e| {
            CdnError::remote(PLATFORM, format!("Failed to parse response of {}: {}", path, e))
        })
    }

    /// `PUT /v2/domain/{domain}/config?{key}` with `{ key: value }`
    async fn set_config(&self, domain: &str, key: &str, value: Value) -> Result<(), CdnError> {
        let path = format!("/v2/domain/{}/config", domain);
        let mut body = serde_json::Map::new();
        body.insert(key.to_string(), value);
        self.send(
            Method::PUT,
            &self.cdn_endpoint,
            &path,
            &[(key, "")],
            Some(Value::Object(body)),
        )
        .await
        .map_err(|e| match e {
            CdnError::Remote { platform, message } => CdnError::Remote {
                platform,
                message: format!("set {} error: {}", key, message),
            },
            other => other,
        })?;
        Ok(())
    }
}

#[async_trait]
impl CdnTarget for BaiduCdnClient {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn list_certificates(&self) -> Result<Vec<RemoteCertificateMeta>, CdnError> {
        let listing: CertListResponse = self
            .send_json(
                Method::GET,
                &self.certificate_endpoint,
                "/v1/certificate/detail",
                &[],
                None,
            )
            .await?;

        Ok(listing
            .certs
            .into_iter()
            .map(|cert| {
                let not_after = parse_time(&cert.cert_stop_time).unwrap_or_else(|| {
                    // An unreadable expiry is treated as expired, so it gets replaced
                    warn!(
                        "Certificate {} has unreadable stop time {:?}",
                        cert.cert_id, cert.cert_stop_time
                    );
                    DateTime::<Utc>::MIN_UTC
                });
                RemoteCertificateMeta {
                    not_before: cert.cert_start_time.as_deref().and_then(parse_time),
                    not_after,
                    common_name: cert.cert_common_name,
                    cert_id: cert.cert_id,
                }
            })
            .collect())
    }

    async fn create_certificate(
        &self,
        certificate_pem: &str,
        private_key_pem: &str,
    ) -> Result<String, CdnError> {
        let common_name = certsync_tls::parse_common_name(certificate_pem)?.ok_or_else(|| {
            certsync_tls::InvalidCertificate("certificate has no common name".to_string())
        })?;
        let cert_name = format!("{}-{}", common_name, Utc::now().format("%Y-%m-%d"));

        let created: CreateCertResponse = self
            .send_json(
                Method::POST,
                &self.certificate_endpoint,
                "/v1/certificate",
                &[],
                Some(json!({
                    "certName": cert_name,
                    "certServerData": certificate_pem,
                    "certPrivateData": private_key_pem,
                })),
            )
            .await?;
        Ok(created.cert_id)
    }

    async fn delete_certificate(&self, cert_id: &str) -> Result<(), CdnError> {
        let path = format!("/v1/certificate/{}", cert_id);
        self.send(Method::DELETE, &self.certificate_endpoint, &path, &[], None)
            .await?;
        Ok(())
    }

    async fn domain_exists(&self, domain: &str) -> Result<bool, CdnError> {
        let path = format!("/v2/domain/{}/valid", domain);
        let valid: ValidDomainResponse = self
            .send_json(Method::GET, &self.cdn_endpoint, &path, &[], None)
            .await?;
        // "valid" means the name can still be added
        Ok(!valid.is_valid)
    }

    async fn create_domain(&self, domain: &str, options: &CdnOptions) -> Result<(), CdnError> {
        let mut body = json!({
            "origin": origin_json(&options.origin),
            "defaultHost": domain,
        });
        if let Some(form) = &options.form {
            body["form"] = json!(form);
        }

        let path = format!("/v2/domain/{}", domain);
        self.send(Method::PUT, &self.cdn_endpoint, &path, &[], Some(body))
            .await?;

        // Follow the client's protocol to the origin
        self.set_config(domain, "originProtocol", json!({ "value": "*" }))
            .await
    }

    async fn bind_certificate(
        &self,
        domain: &str,
        cert_id: &str,
        options: &CdnOptions,
    ) -> Result<(), CdnError> {
        self.set_config(
            domain,
            "https",
            json!({
                "enabled": true,
                "certId": cert_id,
                "http2Enabled": options.http2,
            }),
        )
        .await
    }

    async fn apply_domain_options(
        &self,
        domain: &str,
        options: &CdnOptions,
    ) -> Result<(), CdnError> {
        self.set_config(domain, "ipv6Dispatch", json!({ "enable": options.ipv6 }))
            .await?;

        if !options.origin.is_empty() {
            let path = format!("/v2/domain/{}/config", domain);
            self.send(
                Method::PUT,
                &self.cdn_endpoint,
                &path,
                &[("origin", "")],
                Some(json!({
                    "origin": origin_json(&options.origin),
                    "defaultHost": domain,
                })),
            )
            .await?;
        }

        if let Some(timeout) = &options.origin_timeout {
            self.set_config(
                domain,
                "originTimeout",
                json!({
                    "connectTimeout": timeout.connect_timeout,
                    "loadTimeout": timeout.load_timeout,
                }),
            )
            .await?;
        }

        if let Some(dsa) = options.dsa.as_ref().filter(|dsa| dsa.enabled) {
            let rules: Vec<Value> = dsa
                .rules
                .iter()
                .map(|rule| json!({ "type": rule.rule_type, "value": rule.value }))
                .collect();
            self.set_config(
                domain,
                "dsa",
                json!({
                    "enabled": true,
                    "rules": rules,
                    "comment": dsa.comment.clone().unwrap_or_default(),
                }),
            )
            .await?;
        }

        if let Some(seo) = &options.seo {
            // The platform spells it "diretlyOrigin"
            self.set_config(
                domain,
                "seoSwitch",
                json!({
                    "diretlyOrigin": seo.directly_origin,
                    "pushRecord": seo.push_record,
                }),
            )
            .await?;
        }

        self.set_config(domain, "sni", json!({ "enabled": true, "domain": domain }))
            .await?;
        self.set_config(domain, "quic", json!(options.quic)).await?;
        self.set_config(domain, "http3", json!({ "enable": options.http3 }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certsync_core::config::SeoSwitch;
    use certsync_tls::self_signed_certificate;
    use chrono::Duration;
    use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BaiduCdnClient {
        BaiduCdnClient::new(BaiduCredentials::new("ak-test", "sk-test"))
            .unwrap()
            .with_endpoints(server.uri(), server.uri())
    }

    #[tokio::test]
    async fn test_list_certificates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/certificate/detail"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "certs": [
                    {
                        "certId": "cert-abc",
                        "certName": "cdn.example.com-2024-01-01",
                        "certCommonName": "cdn.example.com",
                        "certStartTime": "2024-01-01T00:00:00Z",
                        "certStopTime": "2024-03-31T00:00:00Z"
                    },
                    {
                        "certId": "cert-bad",
                        "certCommonName": "other.example.com",
                        "certStopTime": "garbage"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let certs = client(&server).list_certificates().await.unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0].cert_id, "cert-abc");
        assert_eq!(certs[0].common_name, "cdn.example.com");
        assert_eq!(
            certs[0].not_after,
            parse_time("2024-03-31T00:00:00Z").unwrap()
        );
        assert!(certs[0].not_before.is_some());
        assert_eq!(certs[1].not_after, DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn test_create_certificate_names_by_common_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/certificate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "certName": "ignored",
                "certId": "cert-new"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let issued =
            self_signed_certificate("cdn.example.com", Utc::now() + Duration::days(90)).unwrap();
        let cert_id = client(&server)
            .create_certificate(&issued.certificate_pem, &issued.private_key_pem)
            .await
            .unwrap();
        assert_eq!(cert_id, "cert-new");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let expected_name = format!("cdn.example.com-{}", Utc::now().format("%Y-%m-%d"));
        assert_eq!(body["certName"], expected_name.as_str());
        assert_eq!(body["certServerData"], issued.certificate_pem.as_str());
    }

    #[tokio::test]
    async fn test_domain_exists_inverts_validity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/domain/new.example.com/valid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "isValid": true })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/domain/cdn.example.com/valid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "isValid": false })))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(!client.domain_exists("new.example.com").await.unwrap());
        assert!(client.domain_exists("cdn.example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_bind_certificate_enables_https() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/domain/cdn.example.com/config"))
            .and(query_param("https", ""))
            .and(body_partial_json(json!({
                "https": { "enabled": true, "certId": "cert-1", "http2Enabled": true }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let options = CdnOptions {
            http2: true,
            ..Default::default()
        };
        client(&server)
            .bind_certificate("cdn.example.com", "cert-1", &options)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_domain_sets_origin_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/domain/cdn.example.com"))
            .and(body_partial_json(json!({ "defaultHost": "cdn.example.com" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v2/domain/cdn.example.com/config"))
            .and(query_param("originProtocol", ""))
            .and(body_partial_json(json!({ "originProtocol": { "value": "*" } })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let options = CdnOptions {
            origin: vec![OriginPeer {
                peer: "https://origin.example.com".into(),
                host: None,
                backup: false,
                follow302: false,
                weight: None,
                isp: None,
            }],
            ..Default::default()
        };
        client(&server)
            .create_domain("cdn.example.com", &options)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_apply_domain_options_pushes_every_setting() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/domain/cdn.example.com/config"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let options = CdnOptions {
            quic: true,
            seo: Some(SeoSwitch {
                directly_origin: "ON".into(),
                push_record: "OFF".into(),
            }),
            ..Default::default()
        };
        client(&server)
            .apply_domain_options("cdn.example.com", &options)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let keys: Vec<String> = requests
            .iter()
            .map(|r| r.url.query().unwrap_or_default().to_string())
            .collect();
        assert_eq!(keys, vec!["ipv6Dispatch", "seoSwitch", "sni", "quic", "http3"]);

        let seo: Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(seo["seoSwitch"]["diretlyOrigin"], "ON");
        let quic: Value = serde_json::from_slice(&requests[3].body).unwrap();
        assert_eq!(quic["quic"], true);
    }

    #[tokio::test]
    async fn test_error_status_is_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/certificate/cert-1"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "CertInUse",
                "message": "certificate is bound to a domain",
                "requestId": "req-1"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .delete_certificate("cert-1")
            .await
            .unwrap_err();
        match err {
            CdnError::Remote { platform, message } => {
                assert_eq!(platform, "baidu");
                assert!(message.contains("CertInUse"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
