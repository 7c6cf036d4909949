use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use asap_crop::crop::{
    CropConfig, CropError, CropHandler, CropPosition, CropRect, CropSession, ImageCrateBackend,
    ImageSource, LocalFile, OutputFormat, RasterBackend, SubmitOutcome, SubmitPlan, Viewport,
    ZoomFactor,
};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgba, RgbaImage};

/// 统计解码/编码调用次数的光栅化实现。
#[derive(Default)]
struct CountingBackend {
    inner: ImageCrateBackend,
    decodes: AtomicUsize,
    encodes: AtomicUsize,
}

impl CountingBackend {
    fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    fn encodes(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }
}

impl RasterBackend for CountingBackend {
    fn decode(&self, bytes: &[u8], config: &CropConfig) -> Result<DynamicImage, CropError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(bytes, config)
    }

    fn draw_square_crop(
        &self,
        image: &DynamicImage,
        rect: &CropRect,
        filter: FilterType,
    ) -> Result<RgbaImage, CropError> {
        self.inner.draw_square_crop(image, rect, filter)
    }

    fn encode(
        &self,
        image: RgbaImage,
        format: OutputFormat,
        jpeg_quality: u8,
    ) -> Result<Vec<u8>, CropError> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        self.inner.encode(image, format, jpeg_quality)
    }
}

/// 像素值编码坐标：R = x / 4，G = y / 4。
fn coordinate_png(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgba([(x / 4) as u8, (y / 4) as u8, 0, 255])
    });
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("failed to encode test image");
    cursor.into_inner()
}

fn png_file(name: &str, width: u32, height: u32) -> ImageSource {
    ImageSource::File(
        LocalFile::new(name, coordinate_png(width, height), 1_700_000_000_000)
            .with_mime_type("image/png"),
    )
}

fn counting_handler() -> (CropHandler, Arc<CountingBackend>) {
    let backend = Arc::new(CountingBackend::default());
    let handler = CropHandler::with_backend(CropConfig::default(), backend.clone())
        .expect("handler init failed");
    (handler, backend)
}

fn expect_cropped(outcome: SubmitOutcome) -> asap_crop::crop::CroppedImage {
    match outcome {
        SubmitOutcome::Cropped(image) => image,
        other => panic!("expected a cropped image, got {:?}", other),
    }
}

fn channel_close(actual: u8, expected: u8) -> bool {
    actual.abs_diff(expected) <= 2
}

#[tokio::test]
async fn centered_crop_samples_middle_square() {
    let handler = CropHandler::new(CropConfig::default()).expect("handler init failed");
    let mut session = CropSession::new();
    session.select_source(png_file("cover.png", 1000, 800));

    let image = expect_cropped(session.prepare_for_submit(&handler).await);
    assert_eq!(image.name, "cover-square.png");
    assert_eq!((image.width, image.height), (800, 800));

    let decoded = image::load_from_memory(&image.bytes)
        .expect("output decodes")
        .to_rgba8();
    assert_eq!(decoded.dimensions(), (800, 800));
    // 采样区域 x∈[100,900)，y∈[0,800)
    assert_eq!(decoded.get_pixel(0, 0), &Rgba([25, 0, 0, 255]));
    assert_eq!(decoded.get_pixel(799, 799), &Rgba([224, 199, 0, 255]));
}

#[tokio::test]
async fn zoomed_corner_crop_is_upsampled() {
    let handler = CropHandler::new(CropConfig::default()).expect("handler init failed");
    let mut session = CropSession::new();
    session.select_source(png_file("cover.png", 1000, 800));
    session.set_zoom(2.0);
    session.set_crop_position(0.0, 0.0);

    let image = expect_cropped(session.prepare_for_submit(&handler).await);
    assert_eq!((image.width, image.height), (800, 800));

    let decoded = image::load_from_memory(&image.bytes)
        .expect("output decodes")
        .to_rgba8();
    let top_left = decoded.get_pixel(0, 0);
    let bottom_right = decoded.get_pixel(799, 799);
    assert!(channel_close(top_left[0], 0) && channel_close(top_left[1], 0));
    // 采样区域为左上角 400x400
    assert!(channel_close(bottom_right[0], 99), "{:?}", bottom_right);
    assert!(channel_close(bottom_right[1], 99), "{:?}", bottom_right);
}

#[tokio::test]
async fn corrupt_source_falls_back_to_original() {
    let handler = CropHandler::new(CropConfig::default()).expect("handler init failed");
    let mut session = CropSession::new();
    let original = b"\x89PNG but not really".to_vec();
    session.select_source(ImageSource::File(LocalFile::new("broken.png", original.clone(), 7)));

    match session.prepare_for_submit(&handler).await {
        SubmitOutcome::Original(ImageSource::File(file)) => {
            assert_eq!(file.name, "broken.png");
            assert_eq!(file.bytes.as_ref(), original.as_slice());
        }
        other => panic!("expected fallback to original, got {:?}", other),
    }
    assert!(session.cache_entry().is_none());
}

#[tokio::test]
async fn unchanged_state_reuses_cached_output() {
    let (handler, backend) = counting_handler();
    let mut session = CropSession::new();
    session.select_source(png_file("cover.png", 120, 90));
    session.set_zoom(1.5);

    let first = expect_cropped(session.prepare_for_submit(&handler).await);
    let second = expect_cropped(session.prepare_for_submit(&handler).await);

    assert_eq!(backend.decodes(), 1);
    assert_eq!(backend.encodes(), 1);
    assert_eq!(first.bytes, second.bytes);
    assert_eq!(first.name, second.name);
}

#[tokio::test]
async fn zoom_change_forces_rasterization() {
    let (handler, backend) = counting_handler();
    let mut session = CropSession::new();
    session.select_source(png_file("cover.png", 120, 90));

    expect_cropped(session.prepare_for_submit(&handler).await);
    assert!(session.zoom_in());
    assert!(matches!(session.plan_submit(), SubmitPlan::Render(_)));
    expect_cropped(session.prepare_for_submit(&handler).await);

    assert_eq!(backend.decodes(), 2);
}

#[tokio::test]
async fn drag_changes_invalidate_cache() {
    let (handler, backend) = counting_handler();
    let mut session = CropSession::new();
    session.select_source(png_file("wide.png", 200, 100));
    session.set_zoom(2.0);
    expect_cropped(session.prepare_for_submit(&handler).await);

    assert!(session.pointer_down(1, 100.0, 100.0));
    assert!(session.pointer_move(1, 90.0, 100.0, Viewport::new(300.0, 300.0)));
    assert!(session.pointer_up(1));
    expect_cropped(session.prepare_for_submit(&handler).await);

    assert_eq!(backend.decodes(), 2);
}

#[tokio::test]
async fn result_for_replaced_source_is_discarded() {
    let handler = CropHandler::new(CropConfig::default()).expect("handler init failed");
    let mut session = CropSession::new();
    session.select_source(png_file("first.png", 64, 64));

    let SubmitPlan::Render(request) = session.plan_submit() else {
        panic!("empty cache should require rendering");
    };
    let result = handler
        .rasterize(&request.source, request.position, request.zoom)
        .await;

    session.select_source(png_file("second.png", 64, 64));
    let outcome = session.finish_rasterization(request, result);

    assert!(matches!(outcome, SubmitOutcome::Discarded));
    assert!(session.cache_entry().is_none());
}

fn serve_png_once(body: Vec<u8>) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
    let port = listener.local_addr().expect("read local addr failed").port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept failed");
        let mut req_buf = [0u8; 1024];
        let _ = stream.read(&mut req_buf);

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).expect("write headers failed");
        stream.write_all(&body).expect("write body failed");
        stream.flush().expect("flush failed");
    });

    (port, server)
}

#[tokio::test]
async fn stored_url_is_fetched_and_cropped() {
    let mut config = CropConfig::default();
    config.allow_private_network = true;
    let handler = CropHandler::new(config).expect("handler init failed");

    let (port, server) = serve_png_once(coordinate_png(90, 60));
    let mut session = CropSession::new();
    session.select_source(ImageSource::Url(format!(
        "http://127.0.0.1:{}/uploads/banner.png?v=3",
        port
    )));

    let image = expect_cropped(session.prepare_for_submit(&handler).await);
    server.join().expect("server thread panicked");

    assert_eq!(image.name, "banner-square.png");
    assert_eq!((image.width, image.height), (60, 60));
    let decoded = image::load_from_memory(&image.bytes).expect("output decodes");
    assert_eq!(decoded.dimensions(), (60, 60));
}

#[tokio::test]
async fn private_url_without_permission_falls_back() {
    let handler = CropHandler::new(CropConfig::default()).expect("handler init failed");
    let mut session = CropSession::new();
    let url = "http://127.0.0.1:9/cover.png".to_string();
    session.select_source(ImageSource::Url(url.clone()));

    match session.prepare_for_submit(&handler).await {
        SubmitOutcome::Original(ImageSource::Url(original)) => assert_eq!(original, url),
        other => panic!("expected fallback to original url, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_url_falls_back_to_original() {
    let mut config = CropConfig::default();
    config.allow_private_network = true;
    let handler = CropHandler::new(config).expect("handler init failed");

    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        listener.local_addr().expect("read local addr failed").port()
    };
    let url = format!("http://127.0.0.1:{}/uploads/cover.png", port);

    let direct = handler
        .rasterize(
            &ImageSource::Url(url.clone()),
            CropPosition::CENTER,
            ZoomFactor::default(),
        )
        .await;
    assert!(matches!(direct, Err(CropError::Fetch(_))), "{:?}", direct);

    let mut session = CropSession::new();
    session.select_source(ImageSource::Url(url.clone()));

    match session.prepare_for_submit(&handler).await {
        SubmitOutcome::Original(ImageSource::Url(original)) => assert_eq!(original, url),
        other => panic!("expected fallback to original url, got {:?}", other),
    }
    assert!(session.cache_entry().is_none());
}
