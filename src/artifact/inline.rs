//! Inline HTML strategy: the rendered pass is the mail body and its images
//! travel as content-addressed parts.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ArtifactStrategy, BARCODE_CID, HEADER_CID, PassAssets};
use crate::error::RenderError;
use crate::mailer::{MailAttachment, OutgoingMail};
use crate::participant::Participant;
use crate::template::{PassBindings, PassTemplate};

const PNG: &str = "image/png";

pub struct InlineStrategy {
    template: Arc<PassTemplate>,
    subject: String,
}

impl InlineStrategy {
    pub fn new(template: Arc<PassTemplate>, subject: impl Into<String>) -> Self {
        Self {
            template,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl ArtifactStrategy for InlineStrategy {
    fn name(&self) -> &'static str {
        "inline"
    }

    async fn package(
        &self,
        participant: &Participant,
        assets: PassAssets,
    ) -> Result<OutgoingMail, RenderError> {
        let header_ref = assets
            .header_png
            .as_ref()
            .map(|_| format!("cid:{HEADER_CID}"));
        let bindings = PassBindings::new(
            participant,
            &assets.barcode_text,
            format!("cid:{BARCODE_CID}"),
            header_ref,
        );
        let html = self.template.render(&bindings)?;

        let mut attachments = vec![MailAttachment::inline(
            BARCODE_CID,
            "barcode.png",
            PNG,
            assets.barcode_png,
        )];
        if let Some(header) = assets.header_png {
            attachments.push(MailAttachment::inline(HEADER_CID, "header.png", PNG, header));
        }

        Ok(OutgoingMail {
            to: participant.email.clone(),
            subject: self.subject.clone(),
            html,
            attachments,
        })
    }
}
