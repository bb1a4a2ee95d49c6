//! Cloud API webhook payloads.
//!
//! Parsing is lenient: unknown fields are ignored and collections default
//! to empty.

use serde::Deserialize;
use serde_json::Value;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ChangeValue {
    #[serde(default)]
    pub messaging_product: String,
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub statuses: Vec<Value>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub display_phone_number: String,
    #[serde(default)]
    pub phone_number_id: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Contact {
    pub profile: Option<Profile>,
    #[serde(default)]
    pub wa_id: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Message {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub text: Option<TextBody>,
    pub image: Option<ImageBody>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ImageBody {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// What a seller sent, reduced to the cases the bot handles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundContent {
    Text(String),
    Image { media_id: String, mime_type: Option<String>, caption: Option<String> },
    Unsupported { kind: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_id: String,
    pub from: String,
    pub profile_name: Option<String>,
    pub content: InboundContent,
}

impl WebhookPayload {
    /// Flattens every entry and change into the messages it carries.
    /// Status-only changes contribute nothing.
    pub fn inbound_messages(&self) -> Vec<InboundMessage> {
        self.entry
            .iter()
            .flat_map(|entry| entry.changes.iter())
            .flat_map(|change| {
                let value = &change.value;
                value.messages.iter().filter(|message| !message.from.is_empty()).map(move |message| {
                    InboundMessage {
                        message_id: message.id.clone(),
                        from: message.from.clone(),
                        profile_name: profile_name_for(&value.contacts, &message.from),
                        content: message.content(),
                    }
                })
            })
            .collect()
    }

    pub fn status_update_count(&self) -> usize {
        self.entry
            .iter()
            .flat_map(|entry| entry.changes.iter())
            .map(|change| change.value.statuses.len())
            .sum()
    }
}

impl Message {
    fn content(&self) -> InboundContent {
        match (self.kind.as_str(), &self.text, &self.image) {
            ("text", Some(text), _) => InboundContent::Text(text.body.clone()),
            ("image", _, Some(image)) => InboundContent::Image {
                media_id: image.id.clone(),
                mime_type: image.mime_type.clone(),
                caption: image.caption.clone().filter(|caption| !caption.trim().is_empty()),
            },
            (kind, _, _) => InboundContent::Unsupported { kind: kind.to_string() },
        }
    }
}

fn profile_name_for(contacts: &[Contact], wa_id: &str) -> Option<String> {
    contacts
        .iter()
        .find(|contact| contact.wa_id == wa_id)
        .or_else(|| contacts.first())
        .and_then(|contact| contact.profile.as_ref())
        .map(|profile| profile.name.trim().to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{InboundContent, WebhookPayload};

    fn envelope(value: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "102290129340398",
                "changes": [{"field": "messages", "value": value}]
            }]
        }))
        .expect("payload")
    }

    #[test]
    fn text_message_is_extracted_with_profile_name() {
        let payload = envelope(json!({
            "messaging_product": "whatsapp",
            "metadata": {"display_phone_number": "15550783881", "phone_number_id": "106540352242922"},
            "contacts": [{"profile": {"name": "Ada Obi"}, "wa_id": "2348012345678"}],
            "messages": [{
                "from": "2348012345678",
                "id": "wamid.HBgN",
                "timestamp": "1700000000",
                "type": "text",
                "text": {"body": "add nike shoes"}
            }]
        }));

        let messages = payload.inbound_messages();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, "wamid.HBgN");
        assert_eq!(messages[0].profile_name.as_deref(), Some("Ada Obi"));
        assert_eq!(messages[0].content, InboundContent::Text("add nike shoes".to_string()));
    }

    #[test]
    fn image_with_caption_and_unsupported_kinds() {
        let payload = envelope(json!({
            "messaging_product": "whatsapp",
            "contacts": [{"profile": {"name": "Ada"}, "wa_id": "234801"}],
            "messages": [
                {
                    "from": "234801", "id": "wamid.1", "timestamp": "1700000001", "type": "image",
                    "image": {"id": "1479537139650973", "mime_type": "image/jpeg", "caption": "new stock"}
                },
                {"from": "234801", "id": "wamid.2", "timestamp": "1700000002", "type": "audio", "audio": {"id": "9"}}
            ]
        }));

        let messages = payload.inbound_messages();

        assert_eq!(
            messages[0].content,
            InboundContent::Image {
                media_id: "1479537139650973".to_string(),
                mime_type: Some("image/jpeg".to_string()),
                caption: Some("new stock".to_string()),
            }
        );
        assert_eq!(messages[1].content, InboundContent::Unsupported { kind: "audio".to_string() });
    }

    #[test]
    fn status_only_payload_yields_no_messages() {
        let payload = envelope(json!({
            "messaging_product": "whatsapp",
            "statuses": [{"id": "wamid.9", "status": "delivered", "recipient_id": "234801"}]
        }));

        assert!(payload.inbound_messages().is_empty());
        assert_eq!(payload.status_update_count(), 1);
    }
}
