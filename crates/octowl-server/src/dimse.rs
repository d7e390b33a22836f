//! DIMSE command model seen by the server.
//!
//! Only the worklist C-FIND exchange is modelled in detail; every other
//! command is carried as its command field so the network layer can apply
//! its own default handling.

use thiserror::Error;

use octowl_core::uids;

/// Command field of a C-FIND request.
pub const C_FIND_RQ: u16 = 0x0020;
/// Command field of a C-FIND response.
pub const C_FIND_RSP: u16 = 0x8020;
/// DIMSE status: success.
pub const STATUS_SUCCESS: u16 = 0x0000;

/// A negotiated presentation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContext {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
}

impl PresentationContext {
    /// Modality Worklist Information Model FIND with Implicit VR Little Endian.
    pub fn worklist_find(id: u8) -> Self {
        Self {
            id,
            abstract_syntax: uids::MODALITY_WORKLIST_INFORMATION_MODEL_FIND.to_string(),
            transfer_syntaxes: vec![uids::IMPLICIT_VR_LITTLE_ENDIAN.to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Medium,
    High,
    Low,
}

impl Priority {
    pub fn code(self) -> u16 {
        match self {
            Priority::Medium => 0x0000,
            Priority::High => 0x0001,
            Priority::Low => 0x0002,
        }
    }
}

/// Whether a dataset follows the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetType {
    Absent,
    Present,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CFindRq {
    pub message_id: u16,
    pub affected_sop_class_uid: String,
    pub priority: Priority,
}

impl CFindRq {
    /// A worklist query with medium priority.
    pub fn worklist(message_id: u16) -> Self {
        Self {
            message_id,
            affected_sop_class_uid: uids::MODALITY_WORKLIST_INFORMATION_MODEL_FIND.to_string(),
            priority: Priority::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CFindRsp {
    pub message_id_being_responded_to: u16,
    pub affected_sop_class_uid: String,
    pub status: u16,
    pub data_set_type: DataSetType,
}

impl CFindRsp {
    /// Final success response to `request`, carrying no dataset.
    pub fn success(request: &CFindRq) -> Self {
        Self {
            message_id_being_responded_to: request.message_id,
            affected_sop_class_uid: request.affected_sop_class_uid.clone(),
            status: STATUS_SUCCESS,
            data_set_type: DataSetType::Absent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimseMessage {
    CFindRq(CFindRq),
    CFindRsp(CFindRsp),
    Other { command_field: u16 },
}

impl DimseMessage {
    pub fn command_field(&self) -> u16 {
        match self {
            DimseMessage::CFindRq(_) => C_FIND_RQ,
            DimseMessage::CFindRsp(_) => C_FIND_RSP,
            DimseMessage::Other { command_field } => *command_field,
        }
    }
}

/// What the network layer should do with an incoming command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Send `response` on the given presentation context.
    Respond {
        presentation_context_id: u8,
        response: DimseMessage,
    },
    /// Not handled here; fall back to the default behavior.
    Delegate,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DimseError {
    #[error("Illegal call: {0}")]
    IllegalCall(String),
}

impl DimseError {
    pub fn illegal_call(message: impl Into<String>) -> Self {
        Self::IllegalCall(message.into())
    }
}

/// Receives every command arriving on an accepted association.
pub trait CommandHandler: Send + Sync {
    fn handle_incoming_command(
        &self,
        message: Option<&DimseMessage>,
        context: &PresentationContext,
    ) -> Result<CommandOutcome, DimseError>;
}
