//! # 加载模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（本地文件 / 远程 URL / data URL）的原始字节加载，
//! 在“尽可能早”的阶段执行体积与地址校验，尽快失败。
//!
//! ## 实现思路
//!
//! - 文件：字节已在内存，只做体积限制；MIME 取声明值，缺失时按文件签名推断。
//! - URL：协议 + 主机安全 + 手动跟随重定向（每一跳重新校验）+ 流式下载与体积限制。
//! - data URL：解析 `data:image/...;base64,` 并在解码前估算体积。
//! - 只尝试一次：失败直接返回，由会话层回退到原图，用户可重新提交。

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use std::net::IpAddr;
use std::time::Duration;

use super::handler::CropHandler;
use super::naming::{infer_name_from_url, normalize_mime};
use super::source::{ImageSource, LocalFile, RawImageData};
use super::{CropConfig, CropError};

const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;
const DEFAULT_SOURCE_MIME: &str = "image/png";

impl CropHandler {
    /// 按来源加载原始字节。
    pub(super) async fn load_source(
        &self,
        source: &ImageSource,
        config: &CropConfig,
    ) -> Result<RawImageData, CropError> {
        match source {
            ImageSource::File(file) => Self::load_from_file(file, config),
            ImageSource::Url(url) if url.trim_start().starts_with("data:") => {
                Self::load_from_data_url(url, config)
            }
            ImageSource::Url(url) => self.load_from_url(url, config).await,
        }
    }

    fn load_from_file(file: &LocalFile, config: &CropConfig) -> Result<RawImageData, CropError> {
        if file.size() > config.max_file_size {
            return Err(CropError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                file.size() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let mime_type = file
            .mime_type
            .as_deref()
            .filter(|mime| !mime.trim().is_empty())
            .map(normalize_mime)
            .unwrap_or_else(|| Self::sniff_mime(&file.bytes));

        Ok(RawImageData {
            bytes: file.bytes.clone(),
            name: file.name.clone(),
            mime_type,
            source_hint: "file",
        })
    }

    async fn load_from_url(
        &self,
        url: &str,
        config: &CropConfig,
    ) -> Result<RawImageData, CropError> {
        log::info!("🌐 开始下载图片 - URL: {}", Self::redact_url_for_log(url));

        Self::validate_url_safety(url, config)?;
        let (bytes, content_type) = self.download_with_validation(url, config).await?;

        let mime_type = content_type
            .map(|ct| normalize_mime(&ct))
            .filter(|mime| mime.starts_with("image/"))
            .unwrap_or_else(|| Self::sniff_mime(&bytes));
        let name = infer_name_from_url(url, &mime_type);

        Ok(RawImageData {
            bytes,
            name,
            mime_type,
            source_hint: "url",
        })
    }

    fn load_from_data_url(data_url: &str, config: &CropConfig) -> Result<RawImageData, CropError> {
        log::info!("📝 开始处理 data URL 图片");

        let (declared_mime, bytes) =
            Self::parse_data_url_with_limit(data_url, config.max_file_size)?;
        let mime_type = declared_mime.unwrap_or_else(|| Self::sniff_mime(&bytes));
        let name = infer_name_from_url(data_url, &mime_type);

        Ok(RawImageData {
            bytes: Bytes::from(bytes),
            name,
            mime_type,
            source_hint: "data-url",
        })
    }

    /// 通过文件签名推断 MIME，无法识别时按 PNG 处理。
    fn sniff_mime(bytes: &[u8]) -> String {
        infer::get(bytes)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| DEFAULT_SOURCE_MIME.to_string())
    }

    /// 执行带校验的网络下载，返回字节与响应的 `Content-Type`。
    ///
    /// 重定向手动跟随，每一跳都重新做地址校验；正文按块读取并限制总体积。
    pub(super) async fn download_with_validation(
        &self,
        url: &str,
        config: &CropConfig,
    ) -> Result<(Bytes, Option<String>), CropError> {
        let client = Self::build_http_client(config)?;
        let mut current_url = reqwest::Url::parse(url)
            .map_err(|e| CropError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

        for redirect_count in 0..=config.max_redirects {
            let response = client
                .get(current_url.clone())
                .header(
                    reqwest::header::ACCEPT,
                    "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
                )
                .send()
                .await
                .map_err(|e| Self::map_reqwest_error(e, current_url.as_str(), config))?;

            if response.status().is_redirection() {
                if redirect_count >= config.max_redirects {
                    return Err(CropError::Fetch(format!(
                        "重定向次数超过限制（{}）",
                        config.max_redirects
                    )));
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .ok_or_else(|| CropError::Fetch("重定向响应缺少 Location 头".to_string()))?;

                let location_str = location
                    .to_str()
                    .map_err(|e| CropError::InvalidFormat(format!("重定向地址无效：{}", e)))?;

                let next_url = current_url
                    .join(location_str)
                    .map_err(|e| CropError::InvalidFormat(format!("重定向 URL 解析失败：{}", e)))?;

                Self::validate_url_safety(next_url.as_str(), config)?;

                log::debug!("↪️ 跳转到: {}", Self::redact_url_for_log(next_url.as_str()));
                current_url = next_url;
                continue;
            }

            if !response.status().is_success() {
                return Err(CropError::Fetch(format!(
                    "HTTP {}: {}",
                    response.status().as_u16(),
                    Self::status_message(response.status().as_u16())
                )));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|ct| ct.to_str().ok())
                .map(|ct| ct.to_string());

            let total_len = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|cl| cl.to_str().ok())
                .and_then(|cl| cl.parse::<u64>().ok());

            if let Some(size) = total_len {
                if size > config.max_file_size {
                    return Err(CropError::ResourceLimit(format!(
                        "文件过大：{:.2} MB（限制：{:.2} MB）",
                        size as f64 / 1024.0 / 1024.0,
                        config.max_file_size as f64 / 1024.0 / 1024.0
                    )));
                }
            }

            let initial_capacity = total_len
                .map(|len| len.min(config.max_file_size).min(usize::MAX as u64) as usize)
                .filter(|len| *len > 0)
                .unwrap_or(BUFFER_INITIAL_CAPACITY);
            let mut buffer = Vec::with_capacity(initial_capacity);
            let mut response = response;
            let mut total: u64 = 0;
            let mut received_first_chunk = false;

            loop {
                let read_timeout = if received_first_chunk {
                    Duration::from_millis(config.stream_chunk_timeout_ms)
                } else {
                    Duration::from_millis(config.stream_first_byte_timeout_ms)
                };

                let next_chunk_result = tokio::time::timeout(read_timeout, response.chunk())
                    .await
                    .map_err(|_| {
                        if received_first_chunk {
                            CropError::Timeout("下载数据流读取超时".to_string())
                        } else {
                            CropError::Timeout("下载首包超时".to_string())
                        }
                    })?;

                let Some(chunk) = next_chunk_result
                    .map_err(|e| CropError::Fetch(format!("下载失败：{}", e)))?
                else {
                    break;
                };

                received_first_chunk = true;
                total = total.saturating_add(chunk.len() as u64);
                if total > config.max_file_size {
                    return Err(CropError::ResourceLimit("下载后文件超过大小限制".to_string()));
                }
                buffer.extend_from_slice(&chunk);
            }

            if buffer.is_empty() {
                return Err(CropError::Fetch("响应内容为空".to_string()));
            }

            log::debug!("✅ 下载完成 - {} bytes", total);
            return Ok((Bytes::from(buffer), content_type));
        }

        Err(CropError::Fetch("下载流程异常结束".to_string()))
    }

    fn build_http_client(config: &CropConfig) -> Result<reqwest::Client, CropError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| CropError::Fetch(format!("无法创建 HTTP 客户端：{}", e)))
    }

    /// 校验 URL 安全性。
    ///
    /// 仅允许 HTTP/HTTPS；默认阻止本地/内网目标。
    fn validate_url_safety(url: &str, config: &CropConfig) -> Result<(), CropError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| CropError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(CropError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }

        if config.allow_private_network {
            return Ok(());
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| CropError::InvalidFormat("URL 缺少主机地址".to_string()))?;

        if Self::is_local_hostname(host) {
            return Err(CropError::InvalidFormat(format!(
                "禁止访问本地网络地址：{}",
                host
            )));
        }

        let bare_host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare_host.parse::<IpAddr>() {
            if Self::is_private_or_local_ip(ip) {
                return Err(CropError::InvalidFormat(format!("禁止访问内网 IP：{}", ip)));
            }
        }

        Ok(())
    }

    fn is_local_hostname(host: &str) -> bool {
        host.eq_ignore_ascii_case("localhost")
            || host.eq_ignore_ascii_case("localhost.")
            || host.ends_with(".local")
    }

    /// 判断 IP 是否属于本地/内网/链路本地等受限范围。
    fn is_private_or_local_ip(ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => {
                if v4.is_private()
                    || v4.is_loopback()
                    || v4.is_link_local()
                    || v4.is_broadcast()
                    || v4.is_documentation()
                    || v4.is_unspecified()
                    || v4.is_multicast()
                {
                    return true;
                }

                let octets = v4.octets();
                octets[0] == 0 || (octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000)
            }
            IpAddr::V6(v6) => {
                v6.is_loopback()
                    || v6.is_unspecified()
                    || v6.is_unique_local()
                    || v6.is_unicast_link_local()
                    || v6.is_multicast()
            }
        }
    }

    pub(crate) fn redact_url_for_log(url: &str) -> String {
        if url.trim_start().starts_with("data:") {
            return "<data-url>".to_string();
        }

        let Ok(parsed) = reqwest::Url::parse(url) else {
            return "<invalid-url>".to_string();
        };

        let host = parsed.host_str().unwrap_or("<unknown-host>");
        let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

        format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
    }

    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, CropError> {
        let len = base64_data.trim().len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| CropError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| CropError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    /// 解析 `data:image/<type>;base64,<payload>`，返回声明的 MIME 与解码字节。
    fn parse_data_url_with_limit(
        data_url: &str,
        max_file_size: u64,
    ) -> Result<(Option<String>, Vec<u8>), CropError> {
        let normalized = data_url.trim();
        let header_end = normalized
            .find(";base64,")
            .ok_or_else(|| CropError::InvalidFormat("data URL 缺少 base64 标记".to_string()))?;

        let declared = normalize_mime(&normalized["data:".len()..header_end]);
        let declared_mime = declared.starts_with("image/").then_some(declared);

        let payload = &normalized[header_end + ";base64,".len()..];
        let estimated_len = Self::estimate_base64_decoded_upper_bound_len(payload)?;
        if estimated_len > max_file_size {
            return Err(CropError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| CropError::Decode(format!("Base64 解码失败：{}", e)))?;

        Ok((declared_mime, bytes))
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(e: reqwest::Error, url: &str, config: &CropConfig) -> CropError {
        let err_msg = e.to_string().replace(url, &Self::redact_url_for_log(url));

        if e.is_timeout() {
            CropError::Timeout(format!("下载超时（{}秒）", config.download_timeout))
        } else if e.is_connect() {
            CropError::Fetch(format!("无法连接：{}", err_msg))
        } else {
            CropError::Fetch(format!("请求失败：{}", err_msg))
        }
    }

    fn status_message(code: u16) -> &'static str {
        match code {
            404 => "未找到",
            403 => "访问被拒绝",
            500..=599 => "服务器错误",
            _ => "请求失败",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// 起一个只响应一次的本地 HTTP 服务，返回端口与服务线程。
    fn serve_once(head: String, body: Vec<u8>) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let port = listener.local_addr().expect("read local addr failed").port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");
            let mut req_buf = [0u8; 1024];
            let _ = stream.read(&mut req_buf);

            stream.write_all(head.as_bytes()).expect("write headers failed");
            stream.write_all(&body).expect("write body failed");
            stream.flush().expect("flush failed");
        });

        (port, server)
    }

    fn private_ok_config() -> CropConfig {
        let mut config = CropConfig::default();
        config.allow_private_network = true;
        config
    }

    #[test]
    fn url_safety_blocks_private_targets_by_default() {
        let config = CropConfig::default();

        assert!(matches!(
            CropHandler::validate_url_safety("http://127.0.0.1/image.png", &config),
            Err(CropError::InvalidFormat(_))
        ));
        assert!(matches!(
            CropHandler::validate_url_safety("https://localhost/image.png", &config),
            Err(CropError::InvalidFormat(_))
        ));
        assert!(matches!(
            CropHandler::validate_url_safety("http://[::1]/image.png", &config),
            Err(CropError::InvalidFormat(_))
        ));
        assert!(matches!(
            CropHandler::validate_url_safety("ftp://example.com/image.png", &config),
            Err(CropError::InvalidFormat(_))
        ));
        assert!(CropHandler::validate_url_safety("https://cdn.example.com/a.png", &config).is_ok());
    }

    #[test]
    fn url_safety_allows_private_targets_when_enabled() {
        let config = private_ok_config();
        assert!(CropHandler::validate_url_safety("http://127.0.0.1/image.png", &config).is_ok());
    }

    #[test]
    fn redact_url_for_log_removes_query_and_fragment() {
        let url = "https://example.com:8443/path/img.png?token=abc123#hash";
        let redacted = CropHandler::redact_url_for_log(url);
        assert_eq!(redacted, "https://example.com:8443/path/img.png");
        assert_eq!(CropHandler::redact_url_for_log("data:image/png;base64,AAAA"), "<data-url>");
    }

    #[test]
    fn data_url_parsing_reads_mime_and_payload() {
        let (mime, bytes) =
            CropHandler::parse_data_url_with_limit("data:image/JPG;base64,SGVsbG8=", 1024)
                .expect("parse data url");
        assert_eq!(mime.as_deref(), Some("image/jpeg"));
        assert_eq!(bytes, b"Hello");
    }

    #[test]
    fn data_url_parsing_rejects_large_payload_before_decode() {
        let huge = format!("data:image/png;base64,{}", "A".repeat(1024 * 1024));
        let result = CropHandler::parse_data_url_with_limit(&huge, 32);
        assert!(matches!(result, Err(CropError::ResourceLimit(_))));
    }

    #[test]
    fn data_url_without_base64_marker_is_rejected() {
        let result = CropHandler::parse_data_url_with_limit("data:image/png,rawdata", 1024);
        assert!(matches!(result, Err(CropError::InvalidFormat(_))));
    }

    #[test]
    fn file_mime_falls_back_to_signature_then_png() {
        let png_signature = vec![137_u8, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13];
        let sniffed = CropHandler::load_from_file(
            &LocalFile::new("a.bin", png_signature, 0),
            &CropConfig::default(),
        )
        .expect("load file");
        assert_eq!(sniffed.mime_type, "image/png");

        let declared = CropHandler::load_from_file(
            &LocalFile::new("a.jpg", vec![1_u8, 2, 3], 0).with_mime_type("image/jpg"),
            &CropConfig::default(),
        )
        .expect("load file");
        assert_eq!(declared.mime_type, "image/jpeg");

        let unknown = CropHandler::load_from_file(
            &LocalFile::new("a.dat", vec![1_u8, 2, 3], 0),
            &CropConfig::default(),
        )
        .expect("load file");
        assert_eq!(unknown.mime_type, "image/png");
    }

    #[test]
    fn file_over_size_limit_is_rejected() {
        let mut config = CropConfig::default();
        config.max_file_size = 2;
        let file = LocalFile::new("a.png", vec![0_u8; 3], 0);
        let result = CropHandler::load_from_file(&file, &config);
        assert!(matches!(result, Err(CropError::ResourceLimit(_))));
    }

    #[tokio::test]
    async fn download_reports_http_failure_as_fetch_error() {
        let body = b"missing".to_vec();
        let head = format!(
            "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let (port, server) = serve_once(head, body);

        let handler = CropHandler::new(CropConfig::default()).expect("handler init failed");
        let url = format!("http://127.0.0.1:{}/missing.png", port);
        let result = handler.download_with_validation(&url, &private_ok_config()).await;

        server.join().expect("server thread failed");
        assert!(matches!(result, Err(CropError::Fetch(_))));
    }

    #[tokio::test]
    async fn download_reports_refused_connection_as_fetch_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
            listener.local_addr().expect("read local addr failed").port()
        };

        let handler = CropHandler::new(CropConfig::default()).expect("handler init failed");
        let url = format!("http://127.0.0.1:{}/cover.png", port);
        let result = handler.download_with_validation(&url, &private_ok_config()).await;

        match result {
            Err(err) => {
                assert!(matches!(err, CropError::Fetch(_)), "unexpected error: {:?}", err);
                assert_eq!(err.code(), "E_FETCH");
                assert_eq!(err.stage(), "fetch");
            }
            Ok(_) => panic!("closed port should not yield a body"),
        }
    }

    #[tokio::test]
    async fn load_from_url_uses_content_type_and_path_name() {
        let body = vec![0xFF_u8, 0xD8, 0xFF, 0xE0, 1, 2, 3, 4];
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let (port, server) = serve_once(head, body.clone());

        let handler = CropHandler::new(CropConfig::default()).expect("handler init failed");
        let url = format!("http://127.0.0.1:{}/projects/u1/cover?v=3", port);
        let raw = handler
            .load_from_url(&url, &private_ok_config())
            .await
            .expect("download should succeed");

        server.join().expect("server thread failed");
        assert_eq!(raw.bytes.as_ref(), body.as_slice());
        assert_eq!(raw.mime_type, "image/jpeg");
        assert_eq!(raw.name, "cover.jpg");
        assert_eq!(raw.source_hint, "url");
    }

    #[tokio::test]
    async fn download_blocks_redirect_to_localhost() {
        let head = "HTTP/1.1 302 Found\r\nLocation: http://localhost:9/final.png\r\n\
                    Content-Length: 0\r\nConnection: close\r\n\r\n"
            .to_string();
        let (port, server) = serve_once(head, Vec::new());

        let handler = CropHandler::new(CropConfig::default()).expect("handler init failed");
        let url = format!("http://127.0.0.1:{}/start.png", port);
        let result = handler
            .download_with_validation(&url, &CropConfig::default())
            .await;

        server.join().expect("server thread failed");
        assert!(matches!(result, Err(CropError::InvalidFormat(_))));
    }
}
