//! Intent resolution from keyword hits and the current page.
//!
//! Rules are applied in priority order, first match wins:
//!
//! 1. how-to, unless improvement / negative / reason keywords are present
//! 2. reason analysis: reason keywords, or negative + analytics
//! 3. report interpretation: evaluation + analytics without improvement
//! 4. site improvement: improvement or negative keywords
//! 5. report interpretation: analytics vocabulary alone
//! 6. general, targeted by the current page
//!
//! On the product's own report pages a client-site target always needs the
//! page context, so the model comments on the client's website rather than
//! on the report UI.

use super::keywords::{KeywordCategory, KeywordHits};
use super::types::{Intent, IntentDescriptor, PageType, Target};

#[derive(Debug, Clone, Copy, Default)]
pub struct IntentResolver;

impl IntentResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, hits: &KeywordHits, page_type: PageType) -> IntentDescriptor {
        use KeywordCategory as K;

        let how_to = hits.has(K::HowTo);
        let reason = hits.has(K::Reason);
        let evaluation = hits.has(K::Evaluation);
        let improvement = hits.has(K::Improvement);
        let negative = hits.has(K::Negative);
        let page_context = hits.has(K::PageContext);
        // Breakdown vocabulary is analytics vocabulary too.
        let analytics = hits.has(K::Analytics)
            || hits.has(K::Country)
            || hits.has(K::City)
            || hits.has(K::Source)
            || hits.has(K::LandingPage)
            || hits.has(K::WhereFrom);

        let (intent, target) = if how_to && !improvement && !negative && !reason {
            (Intent::HowTo, Target::Settings)
        } else if reason || (negative && analytics) {
            (Intent::ReasonAnalysis, Target::ClientSite)
        } else if evaluation && analytics && !improvement {
            (Intent::ReportInterpretation, Target::ClientSite)
        } else if improvement || negative {
            (Intent::SiteImprovement, Target::ClientSite)
        } else if analytics {
            (Intent::ReportInterpretation, Target::ClientSite)
        } else {
            let target = match page_type {
                PageType::ReportDashboard | PageType::AnalysisDetail => Target::ClientSite,
                PageType::Settings => Target::Settings,
                _ => Target::General,
            };
            (Intent::General, target)
        };

        let mut descriptor = IntentDescriptor {
            intent,
            target,
            needs_page: page_context && intent != Intent::HowTo,
            needs_analytics: target == Target::ClientSite,
            guardrail_applied: false,
        };

        if descriptor.target == Target::ClientSite && page_type.is_report_view() {
            descriptor.needs_page = true;
            descriptor.guardrail_applied = true;
        }
        if descriptor.intent == Intent::SiteImprovement {
            descriptor.needs_analytics = true;
        }

        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_core::keywords::KeywordClassifier;

    fn resolve(text: &str, page: PageType) -> IntentDescriptor {
        let hits = KeywordClassifier::new().classify(text);
        IntentResolver::new().resolve(&hits, page)
    }

    #[test]
    fn test_reason_analysis() {
        let d = resolve("Why did visits drop in September?", PageType::Chat);
        assert_eq!(d.intent, Intent::ReasonAnalysis);
        assert_eq!(d.target, Target::ClientSite);
        assert!(d.needs_analytics);
        assert!(!d.guardrail_applied);
    }

    #[test]
    fn test_how_to_targets_settings() {
        let d = resolve("How do I connect GA4?", PageType::ReportDashboard);
        assert_eq!(d.intent, Intent::HowTo);
        assert_eq!(d.target, Target::Settings);
        assert!(!d.needs_analytics);
        assert!(!d.guardrail_applied);
    }

    #[test]
    fn test_how_to_with_because_stays_how_to() {
        let d = resolve(
            "I can't open the report because it's blank, how do I fix it?",
            PageType::Chat,
        );
        assert_eq!(d.intent, Intent::HowTo);
        assert_eq!(d.target, Target::Settings);
    }

    #[test]
    fn test_how_to_with_improvement_is_not_how_to() {
        let d = resolve("How can I improve conversions?", PageType::Chat);
        assert_eq!(d.intent, Intent::SiteImprovement);
        assert!(d.needs_analytics);
    }

    #[test]
    fn test_improvement_on_report_dashboard_hits_guardrail() {
        let d = resolve("改善点を教えて", PageType::ReportDashboard);
        assert_eq!(d.intent, Intent::SiteImprovement);
        assert_eq!(d.target, Target::ClientSite);
        assert!(d.needs_page);
        assert!(d.needs_analytics);
        assert!(d.guardrail_applied);
    }

    #[test]
    fn test_improvement_on_analysis_detail_hits_guardrail() {
        let d = resolve("Any suggestions to make this better?", PageType::AnalysisDetail);
        assert_eq!(d.target, Target::ClientSite);
        assert!(d.needs_page);
    }

    #[test]
    fn test_evaluation_with_analytics() {
        let d = resolve("How is my traffic doing?", PageType::Chat);
        assert_eq!(d.intent, Intent::ReportInterpretation);
        assert!(d.needs_analytics);
    }

    #[test]
    fn test_plain_analytics_is_interpretation() {
        let d = resolve("Which country sends the most sessions", PageType::Other);
        assert_eq!(d.intent, Intent::ReportInterpretation);
    }

    #[test]
    fn test_general_target_follows_page() {
        let d = resolve("hello", PageType::Settings);
        assert_eq!((d.intent, d.target), (Intent::General, Target::Settings));
        assert!(!d.needs_analytics);

        let d = resolve("hello", PageType::Chat);
        assert_eq!(d.target, Target::General);

        let d = resolve("explain this page", PageType::ReportDashboard);
        assert_eq!((d.intent, d.target), (Intent::General, Target::ClientSite));
        assert!(d.needs_page);
        assert!(d.needs_analytics);
    }

    #[test]
    fn test_page_context_sets_needs_page() {
        let d = resolve("What does this chart mean for traffic?", PageType::Other);
        assert!(d.needs_page);
        assert!(!d.guardrail_applied);
    }
}
