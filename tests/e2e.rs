//! End-to-end tests: manifest-free requests through composition and delivery.
//!
//! Storage and email are replaced by in-memory recorders, and photos are
//! generated with the `image` crate, so these run offline.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use image::{DynamicImage, ImageFormat, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use visit_report::deliver::DOWNLOAD_FILE_NAME;
use visit_report::pipeline::layout::{DrawOp, PageKind, Rgb, PAGE_WIDTH};
use visit_report::{
    compose, generate_and_deliver, DeliveryError, EmailBody, EmailMessage, EmailPayload, EmailSender, Observation,
    PhotoInput, ReportConfig, ReportError, ReportRequest, StorageBackend, VisitMetadata,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` with
/// `--nocapture` shows retries and skipped photos.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct RecordingStorage {
    fail: bool,
    uploads: Mutex<Vec<(String, usize)>>,
}

impl StorageBackend for RecordingStorage {
    async fn upload(&self, payload: &[u8], key: &str, _: &str, _: bool) -> Result<String, DeliveryError> {
        if self.fail {
            return Err(DeliveryError::Http {
                service: "storage".into(),
                status: 403,
                body: "bucket not found".into(),
            });
        }
        self.uploads.lock().unwrap().push((key.to_string(), payload.len()));
        Ok(format!("https://files.example.com/{key}"))
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl EmailSender for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn jpeg(width: u32, height: u32) -> PhotoInput {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([120, 160, 200])));
    let mut data = Vec::new();
    img.write_to(&mut Cursor::new(&mut data), ImageFormat::Jpeg).unwrap();
    PhotoInput::new(data).with_mime_hint("image/jpeg")
}

fn signature_png() -> PhotoInput {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 80, Rgba([0, 0, 0, 0])));
    let mut data = Vec::new();
    img.write_to(&mut Cursor::new(&mut data), ImageFormat::Png).unwrap();
    PhotoInput::new(data).with_mime_hint("image/png")
}

fn visit(author: &str) -> VisitMetadata {
    VisitMetadata {
        date: "2024-05-01".into(),
        address: "3 rue Victor Hugo, Lyon".into(),
        author: author.into(),
        arrival_time: "09:00".into(),
        departure_time: "10:30".into(),
        building_code: "A1234".into(),
        people_present: "Gardien".into(),
    }
}

fn observation(kind: &str, photos: Vec<PhotoInput>) -> Observation {
    Observation {
        kind: kind.into(),
        description: "Hall d'entrée propre, boîtes aux lettres en bon état.".into(),
        action: None,
        photos,
    }
}

fn config(dir: &std::path::Path) -> ReportConfig {
    ReportConfig::builder()
        .download_dir(dir)
        .max_retries(0)
        .network_timeout_secs(5)
        .build()
        .unwrap()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_visit_has_cover_and_validation_pages() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let request = ReportRequest {
        visit: visit("Elodie BONNAY"),
        ..Default::default()
    };
    let storage = RecordingStorage::default();
    let mailer = RecordingMailer::default();

    let outcome = generate_and_deliver(&request, &config(dir.path()), &storage, &mailer)
        .await
        .unwrap();

    assert_eq!(outcome.pages, 2);
    assert!(outcome.fully_delivered());
    assert_eq!(outcome.recipient, "ebonnay@orpi.com");

    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ebonnay@orpi.com");
    assert_eq!(sent[0].subject(), "Rapport de visite - 3 rue Victor Hugo, Lyon - 2024-05-01");
    assert!(matches!(sent[0].body, EmailBody::Attachment { .. }));

    let uploads = storage.uploads.lock().unwrap();
    assert_eq!(uploads[0].0, "report_3_rue_Victor_Hugo__Lyon_2024-05-01.pdf");
    assert_eq!(uploads[0].1, outcome.pdf_bytes);

    let local = dir.path().join(DOWNLOAD_FILE_NAME);
    let bytes = std::fs::read(&local).unwrap();
    let pdf = lopdf::Document::load_mem(&bytes).unwrap();
    assert_eq!(pdf.get_pages().len(), 2);
    let cover = pdf.extract_text(&[1]).unwrap();
    assert!(cover.contains("RAPPORT DE VISITE"), "got {cover:?}");
}

#[tokio::test]
async fn positive_observation_gets_green_title_and_centred_photo() {
    init_tracing();
    let request = ReportRequest {
        visit: visit("David SAINT-GERMAIN"),
        observations: vec![observation("✅ Positive", vec![jpeg(600, 400)])],
        ..Default::default()
    };
    let report = compose(&request, &ReportConfig::default()).await.unwrap();
    let doc = &report.document;

    assert_eq!(doc.pages[1].kind, PageKind::Observation { index: 0 });
    let title_color = doc.pages[1].ops.iter().find_map(|op| match op {
        DrawOp::Text { text, color, .. } if text.starts_with("Observation 1") => Some(*color),
        _ => None,
    });
    assert_eq!(title_color, Some(Rgb::POSITIVE));

    assert_eq!(doc.pages[2].kind, PageKind::Photos { index: 0 });
    let placed = doc.pages[2].image_placements();
    assert_eq!(placed.len(), 1);
    let (id, p) = placed[0];
    let centre = p.x + p.width / 2.0;
    assert!((centre - PAGE_WIDTH / 2.0).abs() < 0.5, "centre at {centre}");
    assert!((p.width / p.height - 1.5).abs() < 0.01);
    assert_eq!(doc.image(id).unwrap().width_px, 600);
}

#[tokio::test]
async fn three_photos_feature_first_then_pair_in_order() {
    init_tracing();
    let request = ReportRequest {
        visit: visit("Elodie BONNAY"),
        observations: vec![observation(
            "⚠️ À surveiller",
            vec![jpeg(600, 400), jpeg(400, 300), jpeg(500, 250)],
        )],
        ..Default::default()
    };
    let report = compose(&request, &ReportConfig::default()).await.unwrap();
    let doc = &report.document;

    let placed = doc.pages[2].image_placements();
    assert_eq!(placed.len(), 3);
    let widths: Vec<u32> = placed.iter().map(|(id, _)| doc.image(*id).unwrap().width_px).collect();
    assert_eq!(widths, vec![600, 400, 500]);

    let (_, top) = placed[0];
    let (_, left) = placed[1];
    let (_, right) = placed[2];
    assert!(((top.x + top.width / 2.0) - PAGE_WIDTH / 2.0).abs() < 0.5);
    assert!(top.y > left.y + left.height - 0.5, "feature photo must sit above the pair");
    assert!(left.x + left.width <= right.x);
    assert!((left.y - right.y).abs() < 0.5 || (left.y + left.height - right.y - right.height).abs() < 0.5);
}

#[tokio::test]
async fn unknown_author_goes_to_fallback_address() {
    init_tracing();
    for author in ["", "Jean DUPONT"] {
        let request = ReportRequest {
            visit: visit(author),
            ..Default::default()
        };
        let mailer = RecordingMailer::default();
        let outcome = generate_and_deliver(&request, &ReportConfig::default(), &RecordingStorage::default(), &mailer)
            .await
            .unwrap();
        assert!(outcome.email.is_ok());
        assert_eq!(outcome.recipient, "skita@orpi.com");
        assert_eq!(mailer.sent.lock().unwrap()[0].to, "skita@orpi.com");
    }
}

#[tokio::test]
async fn storage_failure_keeps_local_copy_and_email() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let request = ReportRequest {
        visit: visit("Elodie BONNAY"),
        observations: vec![observation("Positive", vec![jpeg(300, 200)])],
        signature: Some(signature_png()),
        ..Default::default()
    };
    let storage = RecordingStorage {
        fail: true,
        ..Default::default()
    };
    let mailer = RecordingMailer::default();

    let outcome = generate_and_deliver(&request, &config(dir.path()), &storage, &mailer)
        .await
        .unwrap();

    assert!(matches!(outcome.storage, Err(DeliveryError::Http { status: 403, .. })));
    assert!(outcome.email.is_ok());
    assert!(matches!(outcome.local_copy, Some(Ok(_))));
    assert!(dir.path().join(DOWNLOAD_FILE_NAME).exists());
    assert!(outcome.user_message().contains("storage upload failed"));
}

#[tokio::test]
async fn link_mode_emails_the_uploaded_url() {
    init_tracing();
    let request = ReportRequest {
        visit: visit("Elodie BONNAY"),
        ..Default::default()
    };
    let config = ReportConfig::builder()
        .email_payload(EmailPayload::Link)
        .build()
        .unwrap();
    let mailer = RecordingMailer::default();
    let outcome = generate_and_deliver(&request, &config, &RecordingStorage::default(), &mailer)
        .await
        .unwrap();

    let sent = mailer.sent.lock().unwrap();
    match &sent[0].body {
        EmailBody::Link { url } => assert_eq!(outcome.storage.as_ref().ok(), Some(url)),
        other => panic!("expected a link, got {other:?}"),
    }
}

#[tokio::test]
async fn link_mode_falls_back_to_attachment_when_upload_fails() {
    init_tracing();
    let request = ReportRequest {
        visit: visit("Elodie BONNAY"),
        ..Default::default()
    };
    let config = ReportConfig::builder()
        .email_payload(EmailPayload::Link)
        .max_retries(0)
        .build()
        .unwrap();
    let storage = RecordingStorage {
        fail: true,
        ..Default::default()
    };
    let mailer = RecordingMailer::default();
    generate_and_deliver(&request, &config, &storage, &mailer).await.unwrap();

    assert!(matches!(mailer.sent.lock().unwrap()[0].body, EmailBody::Attachment { .. }));
}

#[tokio::test]
async fn unconfigured_collaborators_do_not_fail_generation() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let request = ReportRequest {
        visit: visit("Elodie BONNAY"),
        ..Default::default()
    };
    let storage: Option<RecordingStorage> = None;
    let mailer: Option<RecordingMailer> = None;
    let outcome = generate_and_deliver(&request, &config(dir.path()), &storage, &mailer)
        .await
        .unwrap();
    assert!(matches!(outcome.storage, Err(DeliveryError::NotConfigured { .. })));
    assert!(matches!(outcome.email, Err(DeliveryError::NotConfigured { .. })));
    assert!(matches!(outcome.local_copy, Some(Ok(_))));
}

#[tokio::test]
async fn corrupt_photo_is_skipped_unless_strict() {
    init_tracing();
    let broken = PhotoInput::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 1, 2]);
    let request = ReportRequest {
        visit: visit("Elodie BONNAY"),
        observations: vec![observation("Positive", vec![broken, jpeg(400, 300)])],
        ..Default::default()
    };

    let report = compose(&request, &ReportConfig::default()).await.unwrap();
    assert_eq!(report.photo_errors.len(), 1);
    assert_eq!(report.stats.photos_embedded, 1);
    assert_eq!(report.document.pages[2].image_placements().len(), 1);

    let strict = ReportConfig::builder().strict_images(true).build().unwrap();
    let err = compose(&request, &strict).await.unwrap_err();
    assert!(matches!(err, ReportError::PhotoRejected(_)));
}
