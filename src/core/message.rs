use crate::proto;
use crate::proto::{HubEvent, MessageType};

impl proto::Message {
    pub fn is_type(&self, message_type: proto::MessageType) -> bool {
        self.data.is_some() && self.data.as_ref().unwrap().r#type == message_type as i32
    }

    pub fn fid(&self) -> u64 {
        if self.data.is_some() {
            self.data.as_ref().unwrap().fid
        } else {
            0
        }
    }

    pub fn msg_type(&self) -> MessageType {
        if self.data.is_some() {
            MessageType::try_from(self.data.as_ref().unwrap().r#type).unwrap_or(MessageType::None)
        } else {
            MessageType::None
        }
    }

    pub fn timestamp(&self) -> u32 {
        if self.data.is_some() {
            self.data.as_ref().unwrap().timestamp
        } else {
            0
        }
    }

    pub fn hex_hash(&self) -> String {
        hex::encode(&self.hash)
    }
}

impl proto::HubEvent {
    pub fn from(event_type: proto::HubEventType, body: proto::hub_event::Body) -> Self {
        proto::HubEvent {
            r#type: event_type as i32,
            body: Some(body),

            // Populated at commit time
            id: 0,
            timestamp: 0,
        }
    }

    pub fn merge_message_event(message: proto::Message, deleted: Vec<proto::Message>) -> Self {
        HubEvent::from(
            proto::HubEventType::MergeMessage,
            proto::hub_event::Body::MergeMessageBody(proto::MergeMessageBody {
                message: Some(message),
                deleted_messages: deleted,
            }),
        )
    }
}
