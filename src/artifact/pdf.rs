//! PDF strategy: the pass is printed to a single A4 page by a headless
//! browser and attached to a short confirmation mail.
//!
//! At most one browser is launched per run; each send gets its own page,
//! which is closed as soon as the PDF bytes are back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ArtifactStrategy, PassAssets};
use crate::barcode;
use crate::error::RenderError;
use crate::mailer::{MailAttachment, OutgoingMail};
use crate::participant::Participant;
use crate::template::{PassBindings, PassTemplate};

/// A4 at 96 dpi.
pub const VIEWPORT_WIDTH: u32 = 794;
pub const VIEWPORT_HEIGHT: u32 = 1123;

const A4_WIDTH_IN: f64 = 8.27;
const A4_HEIGHT_IN: f64 = 11.69;
const MARGIN_IN: f64 = 0.4;
/// Slight downscale keeps the pass on one page.
const PRINT_SCALE: f64 = 0.9;

const PDF_FILENAME: &str = "pass.pdf";

const CONFIRMATION_TEMPLATE: &str = "<p>Hi {{Name}},</p>\
<p>Your registration is confirmed. Your {{Pass}} pass is attached as a PDF.</p>\
<p>Please keep it handy and present the barcode at the venue entrance.</p>";

/// Print settings shared by every pass.
pub fn print_params() -> PrintToPdfParams {
    PrintToPdfParams {
        landscape: Some(false),
        display_header_footer: Some(false),
        print_background: Some(true),
        scale: Some(PRINT_SCALE),
        paper_width: Some(A4_WIDTH_IN),
        paper_height: Some(A4_HEIGHT_IN),
        margin_top: Some(MARGIN_IN),
        margin_bottom: Some(MARGIN_IN),
        margin_left: Some(MARGIN_IN),
        margin_right: Some(MARGIN_IN),
        page_ranges: Some("1".to_string()),
        ..Default::default()
    }
}

// ── Renderer ────────────────────────────────────────────────────────

/// HTML to PDF conversion.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError>;

    /// Shut the engine down. Later `render` calls fail.
    async fn close(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Headless Chromium over the DevTools protocol.
///
/// The browser starts on the first `render`, so a run that never prints
/// (failed relay check, empty sheet) never spawns a browser process.
pub struct ChromiumRenderer {
    executable: Option<PathBuf>,
    session: Mutex<Session>,
}

enum Session {
    Idle,
    Running {
        browser: Browser,
        handler: JoinHandle<()>,
    },
    Closed,
}

impl ChromiumRenderer {
    /// `executable` overrides auto-detection.
    pub fn new(executable: Option<&Path>) -> Self {
        Self {
            executable: executable.map(Path::to_path_buf),
            session: Mutex::new(Session::Idle),
        }
    }

    async fn launch(&self) -> Result<(Browser, JoinHandle<()>), RenderError> {
        let mut builder = BrowserConfig::builder()
            .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
            .viewport(Viewport {
                width: VIEWPORT_WIDTH,
                height: VIEWPORT_HEIGHT,
                ..Default::default()
            });
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(RenderError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Browser(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler stopped");
                    break;
                }
            }
        });

        info!("Headless browser launched");
        Ok((browser, handle))
    }
}

#[async_trait]
impl PdfRenderer for ChromiumRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        let page = {
            let mut session = self.session.lock().await;
            if matches!(*session, Session::Idle) {
                let (browser, handler) = self.launch().await?;
                *session = Session::Running { browser, handler };
            }
            let Session::Running { browser, .. } = &*session else {
                return Err(RenderError::Browser("browser already closed".into()));
            };
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| RenderError::Browser(e.to_string()))?
        };

        let printed = async {
            page.set_content(html).await?;
            page.pdf(print_params()).await
        }
        .await;

        if let Err(e) = page.close().await {
            warn!(error = %e, "Failed to close page");
        }

        printed.map_err(|e| RenderError::Pdf(e.to_string()))
    }

    async fn close(&self) -> Result<(), RenderError> {
        let previous = std::mem::replace(&mut *self.session.lock().await, Session::Closed);
        let Session::Running {
            mut browser,
            handler,
        } = previous
        else {
            return Ok(());
        };

        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| RenderError::Browser(e.to_string()));
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "Browser process did not exit cleanly");
        }
        handler.abort();

        info!("Headless browser closed");
        closed
    }
}

// ── Strategy ────────────────────────────────────────────────────────

pub struct PdfStrategy {
    template: Arc<PassTemplate>,
    confirmation: PassTemplate,
    renderer: Arc<dyn PdfRenderer>,
    subject: String,
}

impl PdfStrategy {
    pub fn new(
        template: Arc<PassTemplate>,
        renderer: Arc<dyn PdfRenderer>,
        subject: impl Into<String>,
    ) -> Result<Self, RenderError> {
        Ok(Self {
            template,
            confirmation: PassTemplate::parse(CONFIRMATION_TEMPLATE)?,
            renderer,
            subject: subject.into(),
        })
    }
}

#[async_trait]
impl ArtifactStrategy for PdfStrategy {
    fn name(&self) -> &'static str {
        "pdf"
    }

    async fn package(
        &self,
        participant: &Participant,
        assets: PassAssets,
    ) -> Result<OutgoingMail, RenderError> {
        // The browser cannot resolve cid: parts, so images go in as data URIs.
        let header_ref = assets.header_png.as_deref().map(barcode::data_uri);
        let bindings = PassBindings::new(
            participant,
            &assets.barcode_text,
            barcode::data_uri(&assets.barcode_png),
            header_ref,
        );
        let pass_html = self.template.render(&bindings)?;
        let pdf = self.renderer.render(&pass_html).await?;
        debug!(email = %participant.email, bytes = pdf.len(), "Pass printed to PDF");

        Ok(OutgoingMail {
            to: participant.email.clone(),
            subject: self.subject.clone(),
            html: self.confirmation.render(&bindings)?,
            attachments: vec![MailAttachment::file(PDF_FILENAME, "application/pdf", pdf)],
        })
    }

    async fn finish(&self) {
        if let Err(e) = self.renderer.close().await {
            warn!(error = %e, "Failed to shut down PDF renderer");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Default)]
    struct RecordingRenderer {
        html: StdMutex<Vec<String>>,
        closed: StdMutex<u32>,
    }

    #[async_trait]
    impl PdfRenderer for RecordingRenderer {
        async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError> {
            self.html.lock().unwrap().push(html.to_string());
            Ok(b"%PDF-1.7 stub".to_vec())
        }

        async fn close(&self) -> Result<(), RenderError> {
            *self.closed.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct FailingRenderer;

    #[async_trait]
    impl PdfRenderer for FailingRenderer {
        async fn render(&self, _html: &str) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::Pdf("page crashed".into()))
        }
    }

    fn template() -> Arc<PassTemplate> {
        Arc::new(
            PassTemplate::parse(
                "{{#if useHeaderFallback}}[fallback]{{else}}<img src=\"{{{headerImage}}}\">{{/if}}<img src=\"{{{barcode}}}\">",
            )
            .unwrap(),
        )
    }

    fn participant() -> Participant {
        Participant {
            name: "Asha".into(),
            email: "asha@example.com".into(),
            pass_type: "General".into(),
            ..Default::default()
        }
    }

    fn assets(header: Option<Vec<u8>>) -> PassAssets {
        PassAssets {
            barcode_text: "ELAN_24_asha@example.com".into(),
            barcode_png: vec![1, 2, 3],
            header_png: header,
        }
    }

    #[test]
    fn print_params_are_a4_single_page() {
        let params = print_params();
        assert_eq!(params.paper_width, Some(8.27));
        assert_eq!(params.paper_height, Some(11.69));
        assert_eq!(params.print_background, Some(true));
        assert_eq!(params.scale, Some(0.9));
        assert_eq!(params.page_ranges.as_deref(), Some("1"));
        assert_eq!(params.margin_top, params.margin_bottom);
        assert_eq!(params.margin_left, params.margin_right);
    }

    #[tokio::test]
    async fn pass_html_embeds_data_uris() {
        let renderer = Arc::new(RecordingRenderer::default());
        let strategy = PdfStrategy::new(template(), renderer.clone(), "Your pass").unwrap();

        let mail = strategy
            .package(&participant(), assets(Some(vec![4, 5, 6])))
            .await
            .unwrap();

        let rendered = renderer.html.lock().unwrap();
        assert_eq!(rendered.len(), 1);
        assert_eq!(
            rendered[0],
            "<img src=\"data:image/png;base64,BAUG\"><img src=\"data:image/png;base64,AQID\">"
        );

        assert_eq!(mail.to, "asha@example.com");
        assert!(mail.html.contains("Hi Asha"));
        assert!(mail.html.contains("General pass"));
        assert_eq!(mail.attachments.len(), 1);
        let pdf = mail.attachment("pass.pdf").unwrap();
        assert_eq!(pdf.content_type, "application/pdf");
        assert!(pdf.content_id.is_none());
        assert_eq!(pdf.body, b"%PDF-1.7 stub".to_vec());
    }

    #[tokio::test]
    async fn missing_header_still_renders() {
        let renderer = Arc::new(RecordingRenderer::default());
        let strategy = PdfStrategy::new(template(), renderer.clone(), "Your pass").unwrap();

        let mail = strategy.package(&participant(), assets(None)).await.unwrap();

        assert!(renderer.html.lock().unwrap()[0].starts_with("[fallback]"));
        assert!(mail.attachment("pass.pdf").is_some());
    }

    #[tokio::test]
    async fn renderer_failure_is_render_error() {
        let strategy = PdfStrategy::new(template(), Arc::new(FailingRenderer), "s").unwrap();
        let err = strategy
            .package(&participant(), assets(None))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Pdf(_)));
    }

    #[tokio::test]
    async fn chromium_closed_before_first_render_never_launches() {
        let renderer = ChromiumRenderer::new(Some(Path::new("/nonexistent/chrome")));
        renderer.close().await.unwrap();

        let err = renderer.render("<p>pass</p>").await.unwrap_err();
        assert!(matches!(err, RenderError::Browser(ref m) if m == "browser already closed"));
    }

    #[tokio::test]
    async fn chromium_launches_on_first_render() {
        let renderer = ChromiumRenderer::new(Some(Path::new("/nonexistent/chrome")));

        let err = renderer.render("<p>pass</p>").await.unwrap_err();
        assert!(matches!(err, RenderError::Browser(ref m) if m != "browser already closed"));
        renderer.close().await.unwrap();
    }

    #[tokio::test]
    async fn finish_closes_renderer() {
        let renderer = Arc::new(RecordingRenderer::default());
        let strategy = PdfStrategy::new(template(), renderer.clone(), "s").unwrap();
        strategy.finish().await;
        assert_eq!(*renderer.closed.lock().unwrap(), 1);
    }
}
