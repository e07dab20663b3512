//! Answer resolution
//!
//! Turns a classified question into an answer, a miss worth learning
//! from, or nothing at all.

use crate::error::OracleError;
use crate::fingerprint::Fingerprinter;
use crate::learning::PendingFact;
use crate::store::KnowledgeStore;
use crate::types::{Answer, Category, Classification, Question};

#[derive(Debug)]
pub enum Resolution {
    Answer(Answer),
    /// Lookup missed; learning may fill the gap
    Miss(PendingFact),
    /// The question image could not be fingerprinted
    FetchFailed(OracleError),
    /// No answer and nothing to learn
    Unanswerable(&'static str),
}

#[derive(Clone)]
pub struct AnswerResolver {
    store: KnowledgeStore,
    fingerprinter: Fingerprinter,
}

impl AnswerResolver {
    pub fn new(store: KnowledgeStore, fingerprinter: Fingerprinter) -> Self {
        Self { store, fingerprinter }
    }

    pub async fn resolve(&self, classification: &Classification, question: &Question) -> Resolution {
        match classification {
            Classification::ImageIdentify { category } => self.identify_image(*category, question).await,
            Classification::CapitalByImage => self.capital_by_image(question).await,
            Classification::CapitalByText { country } => self.capital_by_text(country).await,
        }
    }

    async fn identify_image(&self, category: Category, question: &Question) -> Resolution {
        let Some(url) = question.image_url.as_deref() else {
            return Resolution::Unanswerable("image question without image");
        };

        let fingerprint = match self.fingerprinter.fingerprint(url).await {
            Ok(fp) => fp,
            Err(e) => {
                tracing::error!("Error fetching or hashing image: {}", e);
                return Resolution::FetchFailed(e);
            }
        };

        match self.store.find_key(category, fingerprint.as_str()).await {
            Some(country) => Resolution::Answer(Answer::new(&country, category)),
            None => Resolution::Miss(PendingFact::Image { category, fingerprint }),
        }
    }

    /// Country from any image store, then its capital.
    ///
    /// A miss here is never learned from: the disclosure names a capital
    /// but says nothing about which image store the country belongs in.
    async fn capital_by_image(&self, question: &Question) -> Resolution {
        let Some(url) = question.image_url.as_deref() else {
            return Resolution::Unanswerable("capital question without image");
        };

        let fingerprint = match self.fingerprinter.fingerprint(url).await {
            Ok(fp) => fp,
            Err(e) => {
                tracing::warn!("Failed to hash image {}: {}", url, e);
                return Resolution::Unanswerable("capital image could not be hashed");
            }
        };

        let Some((_, country)) = self
            .store
            .find_key_in(&Category::CAPITAL_IMAGE_SEARCH, fingerprint.as_str())
            .await
        else {
            tracing::info!("No country flag matched");
            return Resolution::Unanswerable("no image store knows this country");
        };

        match self.store.find_key(Category::Capital, &country).await {
            Some(capital) => Resolution::Answer(Answer::new(&capital, Category::Capital)),
            None => {
                tracing::info!("Matched {} but its capital is unknown", country);
                Resolution::Unanswerable("capital unknown for matched country")
            }
        }
    }

    async fn capital_by_text(&self, country: &str) -> Resolution {
        match self.store.find_key(Category::Capital, country).await {
            Some(capital) => Resolution::Answer(Answer::new(&capital, Category::Capital)),
            None => Resolution::Miss(PendingFact::Capital {
                country: country.to_string(),
            }),
        }
    }
}
