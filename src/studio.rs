//! In-memory studio sessions: the draft form, the generated concepts and each
//! pose's preview image state.
//!
//! Remote calls never run under the store lock. Callers take a ticket, release
//! the lock, await the call, then commit with the ticket. Every commit checks the
//! session epoch, which moves on resubmit, back and reset, so results of
//! abandoned calls are dropped.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, GenerationError, ImageGenerationError};
use crate::models::{
    Concept, ConceptCardView, GenerationRequest, ImageInput, ImageMeta, ImageSlot, ModelStyle,
    OptionsUpdate, PoseImageState, SlotImages, StudioSnapshot, CONTEXT_MODEL_DECIDES,
};

#[derive(Debug, Clone)]
pub struct DraftInputs {
    pub full_shot: Option<ImageInput>,
    pub detail_shot: Option<ImageInput>,
    pub model_shot: Option<ImageInput>,
    pub model_style: ModelStyle,
    pub context: String,
    pub notes: String,
}

impl Default for DraftInputs {
    fn default() -> Self {
        Self {
            full_shot: None,
            detail_shot: None,
            model_shot: None,
            model_style: ModelStyle::default(),
            context: CONTEXT_MODEL_DECIDES.to_string(),
            notes: String::new(),
        }
    }
}

impl DraftInputs {
    fn slot_mut(&mut self, slot: ImageSlot) -> &mut Option<ImageInput> {
        match slot {
            ImageSlot::FullShot => &mut self.full_shot,
            ImageSlot::DetailShot => &mut self.detail_shot,
            ImageSlot::ModelShot => &mut self.model_shot,
        }
    }

    pub fn slot(&self, slot: ImageSlot) -> Option<&ImageInput> {
        match slot {
            ImageSlot::FullShot => self.full_shot.as_ref(),
            ImageSlot::DetailShot => self.detail_shot.as_ref(),
            ImageSlot::ModelShot => self.model_shot.as_ref(),
        }
    }

    /// Builds the remote request; `None` until the full shot is uploaded.
    pub fn to_request(&self) -> Option<GenerationRequest> {
        Some(GenerationRequest {
            full_shot: self.full_shot.clone()?,
            detail_shot: self.detail_shot.clone(),
            model_shot: self.model_shot.clone(),
            model_style: self.model_style,
            context: self.context.clone(),
            notes: self.notes.clone(),
        })
    }
}

/// One concept plus the lazily created image state of its poses.
#[derive(Debug, Clone)]
pub struct ConceptCard {
    concept: Concept,
    poses: BTreeMap<usize, PoseImageState>,
}

impl ConceptCard {
    pub fn new(concept: Concept) -> Self {
        Self { concept, poses: BTreeMap::new() }
    }

    pub fn pose_state(&self, pose: usize) -> PoseImageState {
        self.poses.get(&pose).cloned().unwrap_or_default()
    }

    /// Moves the pose to `loading` and hands back its prompt.
    pub fn begin(&mut self, pose: usize) -> Result<String, ApiError> {
        let prompt = self
            .concept
            .poses
            .get(pose)
            .map(|p| p.ai_prompt.clone())
            .ok_or(ApiError::PoseOutOfRange(pose))?;
        if matches!(self.poses.get(&pose), Some(PoseImageState::Loading)) {
            return Err(ApiError::PoseInProgress);
        }
        self.poses.insert(pose, PoseImageState::Loading);
        Ok(prompt)
    }

    pub fn finish(&mut self, pose: usize, result: Result<String, ImageGenerationError>) {
        let state = match result {
            Ok(image) => PoseImageState::Ready { image },
            Err(e) => PoseImageState::Failed { message: e.display_message().to_string() },
        };
        self.poses.insert(pose, state);
    }

    pub fn image(&self, pose: usize) -> Option<&str> {
        match self.poses.get(&pose) {
            Some(PoseImageState::Ready { image }) => Some(image),
            _ => None,
        }
    }

    fn view(&self, index: usize) -> ConceptCardView {
        ConceptCardView {
            index,
            concept: self.concept.clone(),
            poses: (0..self.concept.poses.len()).map(|i| self.pose_state(i)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Phase {
    Editing,
    Generating,
    Ready(Vec<ConceptCard>),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationTicket {
    epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoseTicket {
    epoch: u64,
    pub concept: usize,
    pub pose: usize,
}

#[derive(Debug, Clone)]
pub struct StudioSession {
    pub id: Uuid,
    inputs: DraftInputs,
    phase: Phase,
    epoch: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudioSession {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            inputs: DraftInputs::default(),
            phase: Phase::Editing,
            epoch: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn inputs(&self) -> &DraftInputs {
        &self.inputs
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn set_image(&mut self, slot: ImageSlot, image: ImageInput) {
        *self.inputs.slot_mut(slot) = Some(image);
        self.touch();
    }

    pub fn clear_image(&mut self, slot: ImageSlot) -> Option<ImageInput> {
        let removed = self.inputs.slot_mut(slot).take();
        self.touch();
        removed
    }

    pub fn apply_options(&mut self, update: OptionsUpdate) {
        if let Some(style) = update.model_style {
            self.inputs.model_style = style;
        }
        if let Some(context) = update.context {
            self.inputs.context = context;
        }
        if let Some(notes) = update.notes {
            self.inputs.notes = notes;
        }
        self.touch();
    }

    /// Validates the form and enters `generating`. Any earlier concepts, error or in-flight call are dropped.
    pub fn begin_generation(&mut self) -> Result<(GenerationRequest, GenerationTicket), ApiError> {
        if matches!(self.phase, Phase::Generating) {
            return Err(ApiError::GenerationInProgress);
        }
        let request = self.inputs.to_request().ok_or(ApiError::MissingFullShot)?;
        self.epoch += 1;
        self.phase = Phase::Generating;
        self.touch();
        Ok((request, GenerationTicket { epoch: self.epoch }))
    }

    /// Stores the outcome unless the call was abandoned. Returns whether it was applied.
    pub fn finish_generation(
        &mut self,
        ticket: GenerationTicket,
        result: Result<Vec<Concept>, GenerationError>,
    ) -> bool {
        if ticket.epoch != self.epoch || !matches!(self.phase, Phase::Generating) {
            info!(session = %self.id, "dropping result of an abandoned concept generation");
            return false;
        }
        self.phase = match result {
            Ok(concepts) => Phase::Ready(concepts.into_iter().map(ConceptCard::new).collect()),
            Err(e) => Phase::Failed(e.display_message().to_string()),
        };
        self.touch();
        true
    }

    /// Leaves the results view: concepts and error go, inputs stay.
    pub fn back(&mut self) {
        self.epoch += 1;
        self.phase = Phase::Editing;
        self.touch();
    }

    /// Clears files, previews, selections, concepts and error.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.inputs = DraftInputs::default();
        self.phase = Phase::Editing;
        self.touch();
    }

    pub fn card(&self, concept: usize) -> Result<&ConceptCard, ApiError> {
        match &self.phase {
            Phase::Ready(cards) => cards.get(concept).ok_or(ApiError::ConceptOutOfRange(concept)),
            _ => Err(ApiError::NoConcepts),
        }
    }

    fn card_mut(&mut self, concept: usize) -> Result<&mut ConceptCard, ApiError> {
        match &mut self.phase {
            Phase::Ready(cards) => cards.get_mut(concept).ok_or(ApiError::ConceptOutOfRange(concept)),
            _ => Err(ApiError::NoConcepts),
        }
    }

    pub fn begin_pose(&mut self, concept: usize, pose: usize) -> Result<(String, PoseTicket), ApiError> {
        let prompt = self.card_mut(concept)?.begin(pose)?;
        self.touch();
        Ok((prompt, PoseTicket { epoch: self.epoch, concept, pose }))
    }

    pub fn finish_pose(&mut self, ticket: PoseTicket, result: Result<String, ImageGenerationError>) -> bool {
        if ticket.epoch != self.epoch {
            info!(session = %self.id, "dropping pose image for a discarded concept view");
            return false;
        }
        match self.card_mut(ticket.concept) {
            Ok(card) => card.finish(ticket.pose, result),
            Err(_) => return false,
        }
        self.touch();
        true
    }

    pub fn snapshot(&self) -> StudioSnapshot {
        let meta = |slot| self.inputs.slot(slot).map(ImageMeta::from);
        let (concepts, error) = match &self.phase {
            Phase::Ready(cards) => (
                Some(cards.iter().enumerate().map(|(i, c)| c.view(i)).collect()),
                None,
            ),
            Phase::Failed(message) => (None, Some(message.clone())),
            Phase::Editing | Phase::Generating => (None, None),
        };
        StudioSnapshot {
            id: self.id,
            model_style: self.inputs.model_style,
            context: self.inputs.context.clone(),
            notes: self.inputs.notes.clone(),
            images: SlotImages {
                full_shot: meta(ImageSlot::FullShot),
                detail_shot: meta(ImageSlot::DetailShot),
                model_shot: meta(ImageSlot::ModelShot),
            },
            loading: matches!(self.phase, Phase::Generating),
            concepts,
            error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Default for StudioSession {
    fn default() -> Self {
        Self::new()
    }
}

/// All live sessions.
#[derive(Debug, Default)]
pub struct Studio {
    sessions: RwLock<HashMap<Uuid, StudioSession>>,
}

impl Studio {
    pub fn create(&self) -> StudioSnapshot {
        let session = StudioSession::new();
        let snapshot = session.snapshot();
        self.sessions.write().insert(session.id, session);
        snapshot
    }

    pub fn remove(&self, id: Uuid) -> Result<(), ApiError> {
        self.sessions.write().remove(&id).map(|_| ()).ok_or(ApiError::SessionNotFound)
    }

    pub fn read<T>(&self, id: Uuid, f: impl FnOnce(&StudioSession) -> T) -> Result<T, ApiError> {
        let guard = self.sessions.read();
        guard.get(&id).map(f).ok_or(ApiError::SessionNotFound)
    }

    pub fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut StudioSession) -> T) -> Result<T, ApiError> {
        let mut guard = self.sessions.write();
        guard.get_mut(&id).map(f).ok_or(ApiError::SessionNotFound)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }
}
