//! # 图片加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理不同定位符（内嵌 Data URI / URL / 本地文件）的字节加载，并在“尽可能早”
//! 的阶段执行输入校验，最后交给 `pipeline` 解码为 `SourceImage`。
//! 目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - URL：协议 + 主机安全 + 手动重定向 + 内容类型 + 体积校验 + 流式下载。
//! - 内嵌数据：格式解析 + 解码前体积估算。
//! - 文件：存在性 + metadata 体积限制 + 读取。
//! - 所有来源都经过文件签名校验；不做缓存，每次调用独立加载。
//! - 加载器以 trait 注入会话，测试可替换为可控实现。

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use tokio::net::lookup_host;

use super::pipeline::decode_source_image;
use super::source::{ImageLocator, RawImageData, SourceImage};
use super::{LoadError, TryOnConfig};

const STREAM_SIGNATURE_PROBE_BYTES: usize = 4096;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

/// 图片加载器。
///
/// 同一定位符可被多次请求，实现方不要求去重或缓存。
pub trait ImageLoader: Send + Sync {
    fn load(&self, locator: &str) -> impl Future<Output = Result<SourceImage, LoadError>> + Send;
}

impl<L: ImageLoader> ImageLoader for Arc<L> {
    fn load(&self, locator: &str) -> impl Future<Output = Result<SourceImage, LoadError>> + Send {
        self.as_ref().load(locator)
    }
}

/// 默认加载器：支持内嵌数据、HTTP(S) 与本地文件。
pub struct HttpImageLoader {
    config: Arc<TryOnConfig>,
    http_client: reqwest::Client,
}

impl HttpImageLoader {
    /// 根据配置创建加载器，同时构建复用型 HTTP 客户端。
    pub fn new(config: Arc<TryOnConfig>) -> Result<Self, LoadError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.load_timeout_ms))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| LoadError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn load_raw(&self, locator: &ImageLocator) -> Result<RawImageData, LoadError> {
        match locator {
            ImageLocator::Url(url) => self.load_from_url(url).await,
            ImageLocator::Embedded(data) => self.load_from_embedded(data),
            ImageLocator::FilePath(path) => self.load_from_file(path),
        }
    }

    /// 从 URL 加载图片原始字节。
    async fn load_from_url(&self, url: &str) -> Result<RawImageData, LoadError> {
        log::info!("🌐 开始下载图片 - URL: {}", redact_url_for_log(url));

        validate_url_safety(url, &self.config).await?;
        let bytes = self.download_with_validation(url).await?;
        validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "url",
        })
    }

    /// 从内嵌数据（Data URI / 纯 Base64）加载图片原始字节。
    fn load_from_embedded(&self, data: &str) -> Result<RawImageData, LoadError> {
        log::debug!("📝 开始处理内嵌图片数据");

        let bytes = parse_base64_with_limit(data, self.config.max_file_size)?;
        if bytes.len() as u64 > self.config.max_file_size {
            return Err(LoadError::ResourceLimit(format!(
                "内嵌图片解码后体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                self.config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "embedded",
        })
    }

    /// 从本地路径加载图片原始字节。
    fn load_from_file(&self, path: &str) -> Result<RawImageData, LoadError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path);

        let file_path = Path::new(path);
        if !file_path.exists() {
            return Err(LoadError::FileSystem(format!("文件不存在：{}", path)));
        }

        let metadata = std::fs::metadata(file_path)
            .map_err(|e| LoadError::FileSystem(format!("无法读取文件信息：{}", e)))?;

        if metadata.len() > self.config.max_file_size {
            return Err(LoadError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                self.config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = std::fs::read(file_path)
            .map_err(|e| LoadError::FileSystem(format!("无法读取图片文件：{}", e)))?;
        validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "file",
        })
    }

    /// 执行带校验的网络下载。
    ///
    /// 手动跟随重定向，每一跳都重新做主机安全校验；使用流式读取控制内存峰值。
    async fn download_with_validation(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let config = &self.config;
        let mut current_url = reqwest::Url::parse(url)
            .map_err(|e| LoadError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

        for redirect_count in 0..=config.max_redirects {
            log::debug!("📡 发送 HTTP 请求...");
            let response = self
                .http_client
                .get(current_url.clone())
                .header(
                    reqwest::header::ACCEPT,
                    "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
                )
                .send()
                .await
                .map_err(|e| map_reqwest_error(e, current_url.as_str(), config))?;

            if response.status().is_redirection() {
                if redirect_count >= config.max_redirects {
                    return Err(LoadError::Network(format!(
                        "重定向次数超过限制（{}）",
                        config.max_redirects
                    )));
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .ok_or_else(|| LoadError::Network("重定向响应缺少 Location 头".to_string()))?;
                let location_str = location
                    .to_str()
                    .map_err(|e| LoadError::InvalidFormat(format!("重定向地址无效：{}", e)))?;
                let next_url = current_url
                    .join(location_str)
                    .map_err(|e| LoadError::InvalidFormat(format!("重定向 URL 解析失败：{}", e)))?;

                validate_url_safety(next_url.as_str(), config).await?;

                log::debug!("↪️ 跳转到: {}", redact_url_for_log(next_url.as_str()));
                current_url = next_url;
                continue;
            }

            if !response.status().is_success() {
                return Err(LoadError::Network(format!(
                    "HTTP {}: {}",
                    response.status().as_u16(),
                    status_message(response.status().as_u16())
                )));
            }

            if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
                if let Ok(ct_str) = ct.to_str() {
                    if !is_image_content_type(ct_str) {
                        return Err(LoadError::InvalidFormat(format!("不是图片类型：{}", ct_str)));
                    }
                }
            }

            let total_len = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|cl| cl.to_str().ok())
                .and_then(|cl| cl.parse::<u64>().ok());

            if let Some(size) = total_len {
                if size > config.max_file_size {
                    return Err(LoadError::ResourceLimit(format!(
                        "文件过大：{:.2} MB（限制：{:.2} MB）",
                        size as f64 / 1024.0 / 1024.0,
                        config.max_file_size as f64 / 1024.0 / 1024.0
                    )));
                }
            }

            return self.read_body_with_limits(response, total_len).await;
        }

        Err(LoadError::Network("下载流程异常结束".to_string()))
    }

    async fn read_body_with_limits(
        &self,
        mut response: reqwest::Response,
        total_len: Option<u64>,
    ) -> Result<Vec<u8>, LoadError> {
        let config = &self.config;
        let initial_capacity = total_len
            .map(|len| len.min(config.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut total: u64 = 0;
        let mut signature_validated = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        LoadError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        LoadError::Timeout("下载首包超时".to_string())
                    }
                })?
                .map_err(|e| LoadError::Network(format!("下载失败：{}", e)))?;

            let Some(chunk) = next_chunk else {
                break;
            };
            received_first_chunk = true;

            total = total.saturating_add(chunk.len() as u64);
            if total > config.max_file_size {
                return Err(LoadError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);

            if !signature_validated {
                signature_validated =
                    validate_stream_signature_probe(&buffer, STREAM_SIGNATURE_PROBE_BYTES)?;
            }
        }

        if !signature_validated {
            validate_image_signature(&buffer)?;
        }

        log::debug!("✅ 下载完成 - {} bytes", total);
        Ok(buffer)
    }
}

impl ImageLoader for HttpImageLoader {
    async fn load(&self, locator: &str) -> Result<SourceImage, LoadError> {
        let locator = ImageLocator::parse(locator)?;
        log::debug!("🖼️ 加载图片 - 来源类型: {}", locator.source_hint());

        let raw = self.load_raw(&locator).await?;
        decode_source_image(raw, &self.config)
    }
}

/// 校验 URL 安全性。
///
/// 默认阻止本地/内网目标；主机名在开启 `resolve_dns_for_url_safety` 时
/// 先解析，任一解析结果落在内网即拒绝。
async fn validate_url_safety(url: &str, config: &TryOnConfig) -> Result<(), LoadError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| LoadError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(LoadError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
    }

    if config.allow_private_network {
        return Ok(());
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| LoadError::InvalidFormat("URL 缺少主机地址".to_string()))?;

    if is_local_hostname(host) {
        return Err(LoadError::InvalidFormat(format!("禁止访问本地网络地址：{}", host)));
    }

    let bare_host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare_host.parse::<IpAddr>() {
        if is_private_or_local_ip(ip) {
            return Err(LoadError::InvalidFormat(format!("禁止访问内网 IP：{}", ip)));
        }

        return Ok(());
    }

    if config.resolve_dns_for_url_safety {
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| LoadError::InvalidFormat("URL 缺少端口信息".to_string()))?;

        if resolve_public_socket_addrs(host, port).await?.is_empty() {
            return Err(LoadError::InvalidFormat("URL 未解析到有效地址".to_string()));
        }
    }

    Ok(())
}

async fn resolve_public_socket_addrs(host: &str, port: u16) -> Result<Vec<SocketAddr>, LoadError> {
    let addrs = lookup_host((host, port))
        .await
        .map_err(|e| LoadError::InvalidFormat(format!("URL 主机解析失败：{}", e)))?;

    reject_private_addrs(addrs)
}

/// 任一地址命中内网即整体拒绝。
fn reject_private_addrs(
    addrs: impl IntoIterator<Item = SocketAddr>,
) -> Result<Vec<SocketAddr>, LoadError> {
    let mut result = Vec::new();
    for addr in addrs {
        if is_private_or_local_ip(addr.ip()) {
            return Err(LoadError::InvalidFormat(format!(
                "URL 解析结果命中内网地址：{}",
                addr.ip()
            )));
        }

        result.push(addr);
    }

    Ok(result)
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

fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

pub(crate) fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, LoadError> {
    let len = base64_data.trim().len() as u64;
    let groups = len
        .checked_add(3)
        .ok_or_else(|| LoadError::ResourceLimit("Base64 输入长度溢出".to_string()))?
        / 4;

    groups
        .checked_mul(3)
        .ok_or_else(|| LoadError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
}

/// 解析内嵌数据（支持 `data:image/*;base64,` 与纯 Base64），解码前先估算体积。
fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, LoadError> {
    let normalized = data.trim();

    let payload = if let Some(rest) = normalized.strip_prefix("data:") {
        if !rest.to_ascii_lowercase().starts_with("image/") {
            return Err(LoadError::InvalidFormat("内嵌数据不是图片类型".to_string()));
        }
        let base64_start = rest
            .find(";base64,")
            .ok_or_else(|| LoadError::InvalidFormat("缺少 base64 标记".to_string()))?;
        &rest[base64_start + 8..]
    } else {
        normalized
    };

    let estimated_len = estimate_base64_decoded_upper_bound_len(payload)?;
    if estimated_len > max_file_size {
        return Err(LoadError::ResourceLimit(format!(
            "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
            estimated_len as f64 / 1024.0 / 1024.0,
            max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| LoadError::Decode(format!("Base64 解码失败：{}", e)))
}

/// 统一映射 reqwest 错误到加载错误。
fn map_reqwest_error(e: reqwest::Error, url: &str, config: &TryOnConfig) -> LoadError {
    let redacted = redact_url_for_log(url);
    let err_msg = e.to_string().replace(url, &redacted);

    if e.is_timeout() {
        LoadError::Timeout(format!("下载超时（{}毫秒）", config.load_timeout_ms))
    } else if e.is_connect() {
        LoadError::Network(format!("无法连接：{}", err_msg))
    } else {
        LoadError::Network(format!("请求失败：{}", err_msg))
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

/// 通过文件签名（magic bytes）校验输入是否为图片。
fn validate_image_signature(bytes: &[u8]) -> Result<(), LoadError> {
    if bytes.is_empty() {
        return Err(LoadError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| LoadError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(LoadError::InvalidFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(())
}

/// 流式下载阶段的签名探测。
///
/// 返回值：
/// - `Ok(true)`：已识别为图片
/// - `Ok(false)`：当前字节不足以判断，继续下载
/// - `Err(...)`：已识别为非图片，或达到探测上限仍无法识别
fn validate_stream_signature_probe(bytes: &[u8], probe_limit: usize) -> Result<bool, LoadError> {
    if bytes.is_empty() {
        return Ok(false);
    }

    if let Some(kind) = infer::get(bytes) {
        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(LoadError::InvalidFormat(format!(
                "下载内容不是图片类型：{}",
                kind.mime_type()
            )));
        }
        return Ok(true);
    }

    if bytes.len() >= probe_limit {
        return Err(LoadError::InvalidFormat(format!(
            "下载前 {} 字节内无法识别图片类型",
            probe_limit
        )));
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tryon::pipeline::tests::create_png_bytes;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn loader_with(config: TryOnConfig) -> HttpImageLoader {
        HttpImageLoader::new(Arc::new(config)).expect("loader init failed")
    }

    fn private_network_config() -> TryOnConfig {
        let mut config = TryOnConfig::default();
        config.allow_private_network = true;
        config
    }

    /// 单连接测试服务器：读取请求后写回固定响应。
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

    #[tokio::test]
    async fn url_safety_blocks_private_targets_by_default() {
        let config = TryOnConfig::default();

        assert!(matches!(
            validate_url_safety("http://127.0.0.1/image.png", &config).await,
            Err(LoadError::InvalidFormat(_))
        ));
        assert!(matches!(
            validate_url_safety("https://localhost/image.png", &config).await,
            Err(LoadError::InvalidFormat(_))
        ));
        assert!(matches!(
            validate_url_safety("http://[::1]/image.png", &config).await,
            Err(LoadError::InvalidFormat(_))
        ));
        assert!(validate_url_safety("https://93.184.216.34/photo.png", &config).await.is_ok());
    }

    #[tokio::test]
    async fn url_safety_allows_private_targets_when_enabled() {
        assert!(
            validate_url_safety("http://127.0.0.1/image.png", &private_network_config())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn url_safety_resolves_hostnames_when_enabled() {
        let url = "https://wardrobe-tryon.invalid/shirt.png";

        let result = validate_url_safety(url, &TryOnConfig::default()).await;
        assert!(matches!(result, Err(LoadError::InvalidFormat(msg)) if msg.contains("解析")));

        let mut config = TryOnConfig::default();
        config.resolve_dns_for_url_safety = false;
        assert!(validate_url_safety(url, &config).await.is_ok());
    }

    #[test]
    fn resolved_private_addresses_are_rejected() {
        let public: SocketAddr = "93.184.216.34:443".parse().expect("valid addr");
        let private: SocketAddr = "10.0.0.8:443".parse().expect("valid addr");
        let loopback: SocketAddr = "[::1]:443".parse().expect("valid addr");

        assert_eq!(reject_private_addrs([public]).expect("public addr"), vec![public]);
        assert!(matches!(
            reject_private_addrs([public, private]),
            Err(LoadError::InvalidFormat(_))
        ));
        assert!(reject_private_addrs([loopback]).is_err());
    }

    #[test]
    fn content_type_parser_accepts_image_with_params() {
        assert!(is_image_content_type("image/png; charset=utf-8"));
        assert!(is_image_content_type("IMAGE/JPEG"));
        assert!(!is_image_content_type("text/html; charset=utf-8"));
    }

    #[test]
    fn redact_url_for_log_removes_query_and_fragment() {
        let redacted = redact_url_for_log("https://example.com:8443/path/img.png?token=abc123#hash");
        assert_eq!(redacted, "https://example.com:8443/path/img.png");
    }

    #[test]
    fn parse_base64_with_limit_rejects_large_payload_before_decode() {
        let huge = "A".repeat(1024 * 1024);
        let result = parse_base64_with_limit(&huge, 32);
        assert!(matches!(result, Err(LoadError::ResourceLimit(_))));
    }

    #[test]
    fn parse_base64_rejects_non_image_data_uri() {
        let result = parse_base64_with_limit("data:text/plain;base64,SGVsbG8=", u64::MAX);
        assert!(matches!(result, Err(LoadError::InvalidFormat(_))));
    }

    #[test]
    fn stream_signature_probe_behaviour() {
        let png_signature = [137_u8, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13];
        assert!(matches!(validate_stream_signature_probe(&png_signature, 64), Ok(true)));

        let payload = b"<html><body>not an image</body></html>";
        assert!(matches!(
            validate_stream_signature_probe(payload, 64),
            Err(LoadError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn load_embedded_png_decodes_dimensions() {
        let png = create_png_bytes(30, 20);
        let uri = format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(&png));

        let image = loader_with(TryOnConfig::default())
            .load(&uri)
            .await
            .expect("embedded png should load");

        assert_eq!(image.dimensions(), (30, 20));
    }

    #[tokio::test]
    async fn load_embedded_rejects_non_image_payload() {
        let result = loader_with(TryOnConfig::default()).load("data:image/png;base64,SGVsbG8=").await;
        assert!(matches!(result, Err(LoadError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn load_missing_file_reports_filesystem_error() {
        let result = loader_with(TryOnConfig::default())
            .load("/definitely/not/here/shirt.png")
            .await;
        assert!(matches!(result, Err(LoadError::FileSystem(_))));
    }

    #[tokio::test]
    async fn load_from_url_decodes_served_png() {
        let png = create_png_bytes(12, 18);
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            png.len()
        );
        let (port, server) = serve_once(head, png);

        let url = format!("http://127.0.0.1:{}/shirt.png", port);
        let result = loader_with(private_network_config()).load(&url).await;

        server.join().expect("server thread failed");

        let image = result.expect("served png should load");
        assert_eq!(image.dimensions(), (12, 18));
    }

    #[tokio::test]
    async fn load_from_url_rejects_non_image_body_even_when_content_type_is_image() {
        let body = b"hello world".to_vec();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let (port, server) = serve_once(head, body);

        let url = format!("http://127.0.0.1:{}/fake.png", port);
        let result = loader_with(private_network_config()).load(&url).await;

        server.join().expect("server thread failed");

        assert!(matches!(result, Err(LoadError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn load_from_url_reports_http_status() {
        let head = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
        let (port, server) = serve_once(head, Vec::new());

        let url = format!("http://127.0.0.1:{}/missing.png", port);
        let result = loader_with(private_network_config()).load(&url).await;

        server.join().expect("server thread failed");

        match result {
            Err(LoadError::Network(msg)) => assert!(msg.contains("404")),
            other => panic!("expected network error, got {:?}", other.map(|i| i.dimensions())),
        }
    }

    #[tokio::test]
    async fn redirect_to_localhost_is_blocked() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let port = listener.local_addr().expect("read local addr failed").port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");
            let mut req_buf = [0u8; 1024];
            let _ = stream.read(&mut req_buf);

            let response = format!(
                "HTTP/1.1 302 Found\r\nLocation: http://localhost:{}/final.png\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                port
            );
            stream
                .write_all(response.as_bytes())
                .expect("write redirect response failed");
            stream.flush().expect("flush failed");
        });

        // 直接调用下载阶段，起始地址不做校验，验证重定向目标会被重新校验。
        let loader = loader_with(TryOnConfig::default());
        let url = format!("http://127.0.0.1:{}/start.png", port);
        let result = loader.download_with_validation(&url).await;

        server.join().expect("server thread failed");

        assert!(matches!(result, Err(LoadError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn private_start_url_is_blocked_by_default() {
        let result = loader_with(TryOnConfig::default())
            .load("http://127.0.0.1:9/start.png")
            .await;
        assert!(matches!(result, Err(LoadError::InvalidFormat(_))));
    }
}
