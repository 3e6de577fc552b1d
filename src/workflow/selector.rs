//! Turn a step target into a concrete locator

use super::actions::StepError;
use super::variables::substitute;
use crate::config::{Target, Variables};
use crate::gateway::ElementResolutionGateway;
use crate::page::{Locator, PageController};

/// Resolves click/input targets against the live page
///
/// An explicit selector wins. A description triggers a fresh snapshot and a
/// gateway lookup every time; nothing is cached between steps.
pub struct SelectorResolver<'a> {
    page: &'a dyn PageController,
    gateway: &'a dyn ElementResolutionGateway,
}

impl<'a> SelectorResolver<'a> {
    pub fn new(page: &'a dyn PageController, gateway: &'a dyn ElementResolutionGateway) -> Self {
        Self { page, gateway }
    }

    pub async fn resolve(&self, target: &Target, variables: &Variables) -> Result<Locator, StepError> {
        if let Some(ref selector) = target.selector {
            let selector = substitute(selector, variables);
            if selector.trim().is_empty() {
                return Err(StepError::ElementNotFound {
                    target: "<empty selector>".into(),
                });
            }
            return Ok(Locator::new(selector));
        }

        let Some(ref description) = target.description else {
            return Err(StepError::ElementNotFound {
                target: "<no selector or description>".into(),
            });
        };

        let description = substitute(description, variables);
        let snapshot = self.page.capture_snapshot().await?;

        tracing::debug!(
            description = %description,
            url = %snapshot.url,
            elements = snapshot.elements.len(),
            "resolving element by description"
        );

        match self.gateway.find_element(&description, &snapshot).await {
            Some(locator) if !locator.selector.trim().is_empty() => {
                tracing::debug!(description = %description, locator = %locator, "element resolved");
                Ok(locator)
            }
            _ => Err(StepError::ElementNotFound {
                target: description,
            }),
        }
    }
}
