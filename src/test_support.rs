//! 测试用的替身：内容解析器、翻译后端、远程存储，以及一个本地HTTP服务

// 标准库导入
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

// 第三方crate导入
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use url::Url;

// 本地模块导入
use crate::backend::{
    DocumentContainer, DocumentKind, OutputSink, TranslationBackend, TranslationSettings,
    Translator, TranslatorKind,
};
use crate::resolver::{ByteStream, ContentResolver, ResolvedMetadata};
use crate::storage::{Identity, ProgressCallback, RemoteStorage, UploadOutcome};

/// 可配置的内容解析器，统计打开次数与仍未关闭的流
#[derive(Clone)]
pub struct FakeResolver {
    content: Arc<Vec<u8>>,
    mime_type: Option<String>,
    display_name: Option<String>,
    fail_resolve: bool,
    fail_open: bool,
    report_size: bool,
    interrupt: bool,
    opens: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl FakeResolver {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content: Arc::new(content),
            mime_type: None,
            display_name: None,
            fail_resolve: false,
            fail_open: false,
            report_size: true,
            interrupt: false,
            opens: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_mime(mut self, mime_type: &str) -> Self {
        self.mime_type = Some(mime_type.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    pub fn failing_resolve(mut self) -> Self {
        self.fail_resolve = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// 元数据里不给出内容长度
    pub fn without_size(mut self) -> Self {
        self.report_size = false;
        self
    }

    /// 读完内容后报告连接被重置，而不是正常结束
    pub fn interrupted(mut self) -> Self {
        self.interrupt = true;
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

struct TrackedStream {
    inner: Cursor<Vec<u8>>,
    interrupt: bool,
    live: Arc<AtomicUsize>,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let drained = self.inner.position() >= self.inner.get_ref().len() as u64;
        if drained && self.interrupt {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentResolver for FakeResolver {
    async fn resolve(&self, _locator: &Url) -> Result<ResolvedMetadata> {
        if self.fail_resolve {
            anyhow::bail!("metadata unavailable");
        }
        Ok(ResolvedMetadata {
            mime_type: self.mime_type.clone(),
            display_name: self.display_name.clone(),
            size: self.report_size.then(|| self.content.len() as u64),
        })
    }

    async fn open_stream(&self, _locator: &Url) -> Result<ByteStream> {
        if self.fail_open {
            anyhow::bail!("permission denied");
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(TrackedStream {
            inner: Cursor::new(self.content.as_ref().clone()),
            interrupt: self.interrupt,
            live: Arc::clone(&self.live),
        }))
    }
}

#[derive(Default)]
struct BackendStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    translate_calls: AtomicUsize,
    selected: Mutex<Vec<TranslatorKind>>,
    settings: Mutex<Vec<TranslationSettings>>,
    inputs: Mutex<Vec<Vec<u8>>>,
}

/// 翻译后端替身：按配置的 (标题, 内容) 列表发出产物
#[derive(Clone)]
pub struct FakeBackend {
    kind: DocumentKind,
    password: Option<String>,
    artifacts: Vec<(String, String)>,
    fail_translate: bool,
    fail_close: bool,
    stats: Arc<BackendStats>,
}

impl FakeBackend {
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            kind,
            password: None,
            artifacts: vec![("Page 1".to_string(), "<p>1</p>".to_string())],
            fail_translate: false,
            fail_close: false,
            stats: Arc::new(BackendStats::default()),
        }
    }

    /// 容器加密，只有给定密码有效
    pub fn encrypted(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_artifacts(mut self, artifacts: &[(&str, &str)]) -> Self {
        self.artifacts = artifacts
            .iter()
            .map(|(title, content)| (title.to_string(), content.to_string()))
            .collect();
        self
    }

    /// 翻译器写完所有产物后报错
    pub fn failing_translate(mut self) -> Self {
        self.fail_translate = true;
        self
    }

    /// 关闭容器时报错（关闭计数照常增加）
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn containers_opened(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    pub fn containers_closed(&self) -> usize {
        self.stats.closed.load(Ordering::SeqCst)
    }

    pub fn translate_calls(&self) -> usize {
        self.stats.translate_calls.load(Ordering::SeqCst)
    }

    pub fn selected(&self) -> Vec<TranslatorKind> {
        self.stats.selected.lock().clone()
    }

    pub fn last_settings(&self) -> Option<TranslationSettings> {
        self.stats.settings.lock().last().cloned()
    }

    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.stats.inputs.lock().clone()
    }
}

struct FakeContainer {
    kind: DocumentKind,
    password: Option<String>,
    supplied: Option<String>,
    fail_close: bool,
    stats: Arc<BackendStats>,
}

impl DocumentContainer for FakeContainer {
    fn is_encrypted(&self) -> Result<bool> {
        Ok(self.password.is_some())
    }

    fn set_password(&mut self, password: &str) {
        self.supplied = Some(password.to_string());
    }

    fn is_password_valid(&self) -> Result<bool> {
        Ok(self.password == self.supplied)
    }

    fn document_kind(&mut self) -> Result<DocumentKind> {
        Ok(self.kind.clone())
    }

    fn close(&mut self) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            anyhow::bail!("container handle already gone");
        }
        Ok(())
    }
}

struct FakeTranslator {
    artifacts: Vec<(String, String)>,
    fail: bool,
    stats: Arc<BackendStats>,
}

impl Translator for FakeTranslator {
    fn translate(
        &self,
        _container: &mut dyn DocumentContainer,
        output: &mut dyn OutputSink,
        settings: &TranslationSettings,
    ) -> Result<()> {
        self.stats.translate_calls.fetch_add(1, Ordering::SeqCst);
        self.stats.settings.lock().push(settings.clone());

        for (title, content) in &self.artifacts {
            output.begin_artifact(title)?;
            output.writer()?.write_all(content.as_bytes())?;
        }

        if self.fail {
            anyhow::bail!("translator exploded");
        }
        Ok(())
    }
}

impl TranslationBackend for FakeBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentContainer>> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        self.stats.inputs.lock().push(std::fs::read(path)?);

        Ok(Box::new(FakeContainer {
            kind: self.kind.clone(),
            password: self.password.clone(),
            supplied: None,
            fail_close: self.fail_close,
            stats: Arc::clone(&self.stats),
        }))
    }

    fn translator(&self, kind: TranslatorKind) -> Result<Box<dyn Translator>> {
        self.stats.selected.lock().push(kind);
        Ok(Box::new(FakeTranslator {
            artifacts: self.artifacts.clone(),
            fail: self.fail_translate,
            stats: Arc::clone(&self.stats),
        }))
    }
}

#[derive(Default)]
struct StorageStats {
    sign_ins: AtomicUsize,
    uploads: AtomicUsize,
    download_requests: AtomicUsize,
    destinations: Mutex<Vec<String>>,
    uploaded: Mutex<Vec<Vec<u8>>>,
}

/// 远程存储替身，上传时分两步报告进度
#[derive(Clone)]
pub struct FakeStorage {
    identity: Arc<Mutex<Option<Identity>>>,
    fail_sign_in: bool,
    reject_status: Option<u16>,
    download_base: String,
    stats: Arc<StorageStats>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self {
            identity: Arc::new(Mutex::new(None)),
            fail_sign_in: false,
            reject_status: None,
            download_base: "https://storage.example/o".to_string(),
            stats: Arc::new(StorageStats::default()),
        }
    }

    pub fn with_identity(self, uid: &str) -> Self {
        *self.identity.lock() = Some(Identity {
            uid: uid.to_string(),
            token: None,
        });
        self
    }

    pub fn failing_sign_in(mut self) -> Self {
        self.fail_sign_in = true;
        self
    }

    /// 上传以给定状态码被拒绝
    pub fn rejecting_upload(mut self, status: u16) -> Self {
        self.reject_status = Some(status);
        self
    }

    pub fn sign_ins(&self) -> usize {
        self.stats.sign_ins.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.sign_ins()
            + self.stats.uploads.load(Ordering::SeqCst)
            + self.stats.download_requests.load(Ordering::SeqCst)
    }

    pub fn destinations(&self) -> Vec<String> {
        self.stats.destinations.lock().clone()
    }

    pub fn uploaded(&self) -> Vec<Vec<u8>> {
        self.stats.uploaded.lock().clone()
    }
}

#[async_trait]
impl RemoteStorage for FakeStorage {
    fn current_identity(&self) -> Option<Identity> {
        self.identity.lock().clone()
    }

    async fn sign_in_anonymously(&self) -> Result<Identity> {
        self.stats.sign_ins.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_in {
            anyhow::bail!("identity service unavailable");
        }

        let identity = Identity {
            uid: "anon-1".to_string(),
            token: Some("token".to_string()),
        };
        *self.identity.lock() = Some(identity.clone());
        Ok(identity)
    }

    async fn upload_stream(
        &self,
        destination: &str,
        mut stream: ByteStream,
        expected: Option<u64>,
        on_progress: ProgressCallback,
    ) -> Result<UploadOutcome> {
        self.stats.uploads.fetch_add(1, Ordering::SeqCst);

        let mut content = Vec::new();
        stream.read_to_end(&mut content).await?;
        drop(stream);

        let total = content.len() as u64;
        let expected = expected.unwrap_or(0);
        on_progress(total / 2, expected);
        on_progress(total, expected);

        self.stats.destinations.lock().push(destination.to_string());
        self.stats.uploaded.lock().push(content);

        Ok(UploadOutcome {
            success: self.reject_status.is_none(),
            bytes_transferred: total,
            status_code: Some(self.reject_status.unwrap_or(200)),
        })
    }

    fn release(&self) {
        *self.identity.lock() = None;
    }

    async fn download_url(&self, destination: &str) -> Result<String> {
        self.stats.download_requests.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "{}/{}?alt=media&token=t1",
            self.download_base, destination
        ))
    }
}

/// 本地HTTP服务收到的一个请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// 本地HTTP服务的应答
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> Reply + Send + Sync>;

/// 监听回环地址的最小HTTP/1.1服务，每个连接只处理一个请求
pub struct LocalServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl LocalServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Handler = Arc::new(handler);
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let connections = Arc::clone(&connections);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let handler = Arc::clone(&handler);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        let _ = serve(socket, handler, requests).await;
                    });
                }
            })
        };

        Self {
            addr,
            connections,
            requests,
            task,
        }
    }

    /// 服务地址加上路径
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// 不走系统代理的客户端，保证请求落到本地服务
pub fn local_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn serve(
    socket: TcpStream,
    handler: Handler,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(socket);
    let request = read_request(&mut reader).await?;
    let reply = handler(&request);
    requests.lock().push(request);

    let response = format!(
        "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reply.body.len(),
        reply.body
    );
    let socket = reader.get_mut();
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

async fn read_request(reader: &mut BufReader<TcpStream>) -> std::io::Result<RecordedRequest> {
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let mut request_line = line.split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        line.clear();
        reader.read_line(&mut line).await?;
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((key, value)) = header.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    let mut request = RecordedRequest {
        method,
        target,
        headers,
        body: Vec::new(),
    };

    if let Some(length) = request.header("content-length").and_then(|v| v.parse::<usize>().ok()) {
        let mut body = vec![0; length];
        reader.read_exact(&mut body).await?;
        request.body = body;
    } else if request
        .header("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        loop {
            line.clear();
            reader.read_line(&mut line).await?;
            let size = usize::from_str_radix(line.trim(), 16)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            if size == 0 {
                line.clear();
                reader.read_line(&mut line).await?;
                break;
            }
            let mut chunk = vec![0; size];
            reader.read_exact(&mut chunk).await?;
            request.body.extend_from_slice(&chunk);
            line.clear();
            reader.read_line(&mut line).await?;
        }
    }

    Ok(request)
}
