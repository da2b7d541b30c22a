//! Aliyun OSS custom-domain (CNAME) client

use async_trait::async_trait;
use certsync_core::UtcDateTime;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::signing::{AliyunCredentials, OssSigner, SigningRequest, UNSIGNED_PAYLOAD};
use crate::errors::StorageError;
use crate::traits::{Binding, BoundCertificate, ObjectStorageTarget};

pub const PLATFORM: &str = "aliyun";

/// OSS API response structures
#[derive(Debug, Deserialize)]
struct ListCnameResult {
    #[serde(rename = "Cname", default)]
    cnames: Vec<CnameInfo>,
}

#[derive(Debug, Deserialize)]
struct CnameInfo {
    #[serde(rename = "Domain")]
    domain: String,
    #[serde(rename = "Certificate", default)]
    certificate: Option<CnameCertificate>,
}

#[derive(Debug, Deserialize)]
struct CnameCertificate {
    #[serde(rename = "CertId", default)]
    cert_id: Option<String>,
    #[serde(rename = "ValidEndDate", default)]
    valid_end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CnameToken {
    #[serde(rename = "Token")]
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Request body of CreateCnameToken and PutCname
#[derive(Debug, Serialize)]
#[serde(rename = "BucketCnameConfiguration")]
struct BucketCnameConfiguration<'a> {
    #[serde(rename = "Cname")]
    cname: CnameConfiguration<'a>,
}

#[derive(Debug, Serialize)]
struct CnameConfiguration<'a> {
    #[serde(rename = "Domain")]
    domain: &'a str,
    #[serde(
        rename = "CertificateConfiguration",
        skip_serializing_if = "Option::is_none"
    )]
    certificate: Option<CertificateConfiguration<'a>>,
}

#[derive(Debug, Serialize)]
struct CertificateConfiguration<'a> {
    #[serde(rename = "Certificate")]
    certificate: &'a str,
    #[serde(rename = "PrivateKey")]
    private_key: &'a str,
    #[serde(rename = "Force")]
    force: bool,
}

/// OSS reports certificate end dates in more than one layout
fn parse_valid_end(value: &str) -> Option<UtcDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(value) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%b %d %H:%M:%S %Y GMT")
        .ok()
        .map(|t| t.and_utc())
}

fn xml_body<T: Serialize>(value: &T) -> Result<String, StorageError> {
    quick_xml::se::to_string(value).map_err(|e| StorageError::Xml(e.to_string()))
}

fn parse_xml<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, StorageError> {
    quick_xml::de::from_str(body).map_err(|e| StorageError::Xml(e.to_string()))
}

/// Aliyun OSS object-storage target
pub struct AliyunOssClient {
    client: Client,
    signer: OssSigner,
    /// Replaces `https://<bucket>.oss-<region>.aliyuncs.com`, e.g. for a mock server
    endpoint_override: Option<String>,
}

impl AliyunOssClient {
    pub fn new(credentials: AliyunCredentials) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| StorageError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            signer: OssSigner::new(credentials),
            endpoint_override: None,
        })
    }

    pub fn from_env() -> Result<Self, StorageError> {
        Self::new(AliyunCredentials::from_env()?)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    fn bucket_url(&self, bucket: &str, region: &str) -> String {
        match &self.endpoint_override {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.oss-{}.aliyuncs.com", bucket, region),
        }
    }

    /// Send a signed bucket-level request; the status is left to the caller
    async fn send(
        &self,
        method: Method,
        bucket: &str,
        region: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<(StatusCode, String), StorageError> {
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
        let url = format!("{}/?{}", self.bucket_url(bucket, region), pairs.join("&"));

        let now = Utc::now();
        let oss_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let mut headers = vec![
            ("x-oss-date", oss_date.as_str()),
            ("x-oss-content-sha256", UNSIGNED_PAYLOAD),
        ];
        if body.is_some() {
            headers.push(("content-type", "application/xml"));
        }

        let authorization = self.signer.sign(
            &SigningRequest {
                method: method.as_str(),
                bucket,
                region,
                query,
                headers: &headers,
            },
            now,
        )?;

        debug!("OSS request: {} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", authorization);
        for (name, value) in &headers {
            request = request.header(*name, *value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    fn remote_error(action: &str, status: StatusCode, body: &str) -> StorageError {
        let error: ErrorResponse = parse_xml(body).unwrap_or_default();
        StorageError::remote(
            PLATFORM,
            format!("{} returned {}: {} {}", action, status, error.code, error.message),
        )
    }

    async fn get_cname_token(
        &self,
        bucket: &str,
        region: &str,
        domain: &str,
    ) -> Result<String, StorageError> {
        let (status, body) = self
            .send(
                Method::GET,
                bucket,
                region,
                &[("comp", "token"), ("cname", domain)],
                None,
            )
            .await?;
        if !status.is_success() {
            return Err(Self::remote_error("GetCnameToken", status, &body));
        }
        Ok(parse_xml::<CnameToken>(&body)?.token)
    }
}

#[async_trait]
impl ObjectStorageTarget for AliyunOssClient {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn bucket_exists(&self, bucket: &str, region: &str) -> Result<bool, StorageError> {
        let (status, body) = self
            .send(Method::GET, bucket, region, &[("bucketInfo", "")], None)
            .await?;
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND {
            let error: ErrorResponse = parse_xml(&body).unwrap_or_default();
            if error.code == "NoSuchBucket" {
                return Ok(false);
            }
        }
        Err(Self::remote_error("GetBucketInfo", status, &body))
    }

    async fn list_bound_domains(
        &self,
        bucket: &str,
        region: &str,
    ) -> Result<Vec<Binding>, StorageError> {
        let (status, body) = self
            .send(Method::GET, bucket, region, &[("cname", "")], None)
            .await?;
        if !status.is_success() {
            return Err(Self::remote_error("ListCname", status, &body));
        }

        let result: ListCnameResult = parse_xml(&body)?;
        Ok(result
            .cnames
            .into_iter()
            .map(|cname| Binding {
                certificate: cname.certificate.map(|cert| {
                    let valid_end = cert.valid_end_date.as_deref().and_then(|raw| {
                        let parsed = parse_valid_end(raw);
                        if parsed.is_none() {
                            warn!("Unreadable certificate end date {:?} on {}", raw, cname.domain);
                        }
                        parsed
                    });
                    BoundCertificate {
                        cert_id: cert.cert_id,
                        valid_end,
                    }
                }),
                domain: cname.domain,
            })
            .collect())
    }

    async fn create_ownership_token(
        &self,
        bucket: &str,
        region: &str,
        domain: &str,
    ) -> Result<String, StorageError> {
        match self.get_cname_token(bucket, region, domain).await {
            Ok(token) => return Ok(token),
            Err(e) => debug!("No reusable CNAME token for {}: {}", domain, e),
        }

        let body = xml_body(&BucketCnameConfiguration {
            cname: CnameConfiguration {
                domain,
                certificate: None,
            },
        })?;
        let (status, body) = self
            .send(
                Method::POST,
                bucket,
                region,
                &[("cname", ""), ("comp", "token")],
                Some(body),
            )
            .await?;
        if !status.is_success() {
            return Err(Self::remote_error("CreateCnameToken", status, &body));
        }
        Ok(parse_xml::<CnameToken>(&body)?.token)
    }

    async fn bind_domain(
        &self,
        bucket: &str,
        region: &str,
        domain: &str,
        certificate_pem: &str,
        private_key_pem: &str,
    ) -> Result<(), StorageError> {
        let body = xml_body(&BucketCnameConfiguration {
            cname: CnameConfiguration {
                domain,
                certificate: Some(CertificateConfiguration {
                    certificate: certificate_pem,
                    private_key: private_key_pem,
                    force: true,
                }),
            },
        })?;
        let (status, body) = self
            .send(
                Method::POST,
                bucket,
                region,
                &[("cname", ""), ("comp", "add")],
                Some(body),
            )
            .await?;
        if !status.is_success() {
            return Err(Self::remote_error("PutCname", status, &body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{header, header_exists, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AliyunOssClient {
        AliyunOssClient::new(AliyunCredentials::new("LTAI-test", "secret"))
            .unwrap()
            .with_endpoint(server.uri())
    }

    #[test]
    fn test_parse_valid_end_layouts() {
        let expected = Utc.with_ymd_and_hms(2048, 5, 4, 10, 14, 51).unwrap();
        assert_eq!(parse_valid_end("2048-05-04T10:14:51Z"), Some(expected));
        assert_eq!(parse_valid_end("Mon, 4 May 2048 10:14:51 GMT"), Some(expected));
        assert_eq!(parse_valid_end("May 04 10:14:51 2048 GMT"), Some(expected));
        assert_eq!(parse_valid_end(""), None);
        assert_eq!(parse_valid_end("soon"), None);
    }

    #[test]
    fn test_put_cname_body() {
        let body = xml_body(&BucketCnameConfiguration {
            cname: CnameConfiguration {
                domain: "static.example.com",
                certificate: Some(CertificateConfiguration {
                    certificate: "CERT",
                    private_key: "KEY",
                    force: true,
                }),
            },
        })
        .unwrap();
        assert_eq!(
            body,
            "<BucketCnameConfiguration><Cname><Domain>static.example.com</Domain>\
             <CertificateConfiguration><Certificate>CERT</Certificate>\
             <PrivateKey>KEY</PrivateKey><Force>true</Force>\
             </CertificateConfiguration></Cname></BucketCnameConfiguration>"
        );
    }

    #[tokio::test]
    async fn test_bucket_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("bucketInfo", ""))
            .and(header_exists("authorization"))
            .and(header("x-oss-content-sha256", "UNSIGNED-PAYLOAD"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<BucketInfo><Bucket><Name>assets</Name></Bucket></BucketInfo>",
            ))
            .mount(&server)
            .await;

        assert!(client(&server)
            .bucket_exists("assets", "cn-hangzhou")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("bucketInfo", ""))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                "<Error><Code>NoSuchBucket</Code><Message>The specified bucket does not exist.</Message></Error>",
            ))
            .mount(&server)
            .await;

        assert!(!client(&server)
            .bucket_exists("assets", "cn-hangzhou")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_access_denied_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("bucketInfo", ""))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<Error><Code>AccessDenied</Code><Message>denied</Message></Error>",
            ))
            .mount(&server)
            .await;

        let err = client(&server)
            .bucket_exists("assets", "cn-hangzhou")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("AccessDenied"));
    }

    #[tokio::test]
    async fn test_list_bound_domains() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("cname", ""))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <ListCnameResult>
                    <Bucket>assets</Bucket>
                    <Owner>owner</Owner>
                    <Cname>
                        <Domain>static.example.com</Domain>
                        <Status>Enabled</Status>
                        <Certificate>
                            <Type>Upload</Type>
                            <CertId>493-cn-hangzhou</CertId>
                            <ValidEndDate>Mon, 4 May 2048 10:14:51 GMT</ValidEndDate>
                        </Certificate>
                    </Cname>
                    <Cname>
                        <Domain>plain.example.com</Domain>
                        <Status>Enabled</Status>
                    </Cname>
                </ListCnameResult>"#,
            ))
            .mount(&server)
            .await;

        let bindings = client(&server)
            .list_bound_domains("assets", "cn-hangzhou")
            .await
            .unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].domain, "static.example.com");
        let cert = bindings[0].certificate.as_ref().unwrap();
        assert_eq!(cert.cert_id.as_deref(), Some("493-cn-hangzhou"));
        assert_eq!(
            cert.valid_end,
            Some(Utc.with_ymd_and_hms(2048, 5, 4, 10, 14, 51).unwrap())
        );
        assert!(bindings[1].certificate.is_none());
    }

    #[tokio::test]
    async fn test_existing_token_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("comp", "token"))
            .and(query_param("cname", "static.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<CnameToken><Bucket>assets</Bucket><Cname>static.example.com</Cname><Token>tok-existing</Token></CnameToken>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let token = client(&server)
            .create_ownership_token("assets", "cn-hangzhou", "static.example.com")
            .await
            .unwrap();
        assert_eq!(token, "tok-existing");
    }

    #[tokio::test]
    async fn test_token_is_created_when_none_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("comp", "token"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                "<Error><Code>CnameTokenNotFound</Code><Message>none</Message></Error>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(query_param("cname", ""))
            .and(query_param("comp", "token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<CnameToken><Bucket>assets</Bucket><Cname>static.example.com</Cname><Token>tok-new</Token></CnameToken>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let token = client(&server)
            .create_ownership_token("assets", "cn-hangzhou", "static.example.com")
            .await
            .unwrap();
        assert_eq!(token, "tok-new");
    }

    #[tokio::test]
    async fn test_bind_domain_forces_certificate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("cname", ""))
            .and(query_param("comp", "add"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .bind_domain("assets", "cn-hangzhou", "static.example.com", "CERT", "KEY")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(body.contains("<Domain>static.example.com</Domain>"));
        assert!(body.contains("<Force>true</Force>"));
    }
}
