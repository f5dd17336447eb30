//! Scene discrimination seam.
//!
//! Before an event is appended to a block, the writer asks a discriminator
//! for the event's scene; events with no scene are dropped. Classifiers are
//! stateful per file, so the writer builds a fresh instance from its factory
//! on every rotation.

/// Opaque classification assigned to an event body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    label: String,
}

impl Scene {
    /// Creates a scene with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Returns the scene's label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Classifies event bodies into scenes.
pub trait Discriminator: Send {
    /// Returns the scene for `body`, or `None` to drop the event.
    fn scene_of(&mut self, body: &[u8]) -> Option<Scene>;
}

/// Factory invoked on every file rotation to obtain a fresh discriminator.
pub type DiscriminatorFactory = Box<dyn Fn() -> Box<dyn Discriminator> + Send>;

/// Discriminator that places every event in one catch-all scene.
///
/// This is the default wired into the store; deployments with a real
/// classifier swap in their own [`Discriminator`] implementation.
#[derive(Debug, Default)]
pub struct SingleSceneDiscriminator;

impl Discriminator for SingleSceneDiscriminator {
    fn scene_of(&mut self, _body: &[u8]) -> Option<Scene> {
        Some(Scene::new("default"))
    }
}
