//! Keyword classification of user messages.
//!
//! Each category owns an immutable table of Japanese and English phrases.
//! A message hits a category when any phrase occurs as a substring of the
//! lowercased message.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeywordCategory {
    Country,
    City,
    Source,
    LandingPage,
    HowTo,
    Reason,
    Evaluation,
    Improvement,
    Negative,
    Analytics,
    PageContext,
    /// "Where did visitors come from" style questions.
    WhereFrom,
}

// ─── Tables ──────────────────────────────────────────────────────────────────

const COUNTRY: &[&str] = &[
    "国別", "国ごと", "どの国", "海外", "country", "countries", "overseas", "international",
];

const CITY: &[&str] = &["都市", "市区町村", "都道府県", "地域別", "city", "cities"];

const SOURCE: &[&str] = &[
    "流入元",
    "参照元",
    "流入経路",
    "チャネル",
    "メディア別",
    "source",
    "medium",
    "channel",
    "referral",
    "referrer",
    "organic",
    "utm",
];

const LANDING_PAGE: &[&str] = &[
    "ランディング",
    "入口ページ",
    "着地ページ",
    "landing",
    "entry page",
];

const HOW_TO: &[&str] = &[
    "使い方",
    "やり方",
    "設定方法",
    "どうやって",
    "どこで設定",
    "連携方法",
    "how to",
    "how do i",
    "how can i",
    "where can i",
    "where do i find",
    "set up",
    "setup",
    "configure",
];

// "cause" alone would also match "because".
const REASON: &[&str] = &[
    "なぜ", "原因", "理由", "どうして", "why", "reason", "caused", "causes", "causing",
];

const EVALUATION: &[&str] = &[
    "評価",
    "状況",
    "調子",
    "良い",
    "悪い",
    "どうですか",
    "どうだった",
    "how is",
    "how are",
    "how was",
    "how's",
    "doing",
    "good",
    "bad",
    "healthy",
    "performance",
    "performing",
];

const IMPROVEMENT: &[&str] = &[
    "改善",
    "増やす",
    "増やし",
    "上げる",
    "伸ばす",
    "対策",
    "施策",
    "提案",
    "improve",
    "increase",
    "boost",
    "grow",
    "optimi",
    "better",
    "recommend",
    "suggest",
    "tips",
];

const NEGATIVE: &[&str] = &[
    "減少",
    "減った",
    "減って",
    "下がった",
    "下がって",
    "落ちた",
    "落ちて",
    "低下",
    "悪化",
    "drop",
    "declin",
    "decreas",
    "fell",
    "falling",
    "went down",
    "gone down",
    "worse",
    "plummet",
    "lost",
];

const ANALYTICS: &[&str] = &[
    "アクセス",
    "訪問",
    "セッション",
    "ユーザー",
    "ページビュー",
    "直帰",
    "コンバージョン",
    "流入",
    "検索",
    "traffic",
    "visit",
    "session",
    "user",
    "pageview",
    "page view",
    "bounce",
    "conversion",
    "engagement",
    "analytics",
    "ga4",
    "impression",
    "clicks",
    "ctr",
];

const PAGE_CONTEXT: &[&str] = &[
    "このページ",
    "この画面",
    "このレポート",
    "この分析",
    "このグラフ",
    "表示されている",
    "this page",
    "this report",
    "this screen",
    "this chart",
    "this graph",
    "this analysis",
    "shown here",
];

const WHERE_FROM: &[&str] = &[
    "どこから",
    "どこ経由",
    "where did",
    "where are",
    "where do",
    "come from",
    "coming from",
    "came from",
];

const TABLE: &[(KeywordCategory, &[&str])] = &[
    (KeywordCategory::Country, COUNTRY),
    (KeywordCategory::City, CITY),
    (KeywordCategory::Source, SOURCE),
    (KeywordCategory::LandingPage, LANDING_PAGE),
    (KeywordCategory::HowTo, HOW_TO),
    (KeywordCategory::Reason, REASON),
    (KeywordCategory::Evaluation, EVALUATION),
    (KeywordCategory::Improvement, IMPROVEMENT),
    (KeywordCategory::Negative, NEGATIVE),
    (KeywordCategory::Analytics, ANALYTICS),
    (KeywordCategory::PageContext, PAGE_CONTEXT),
    (KeywordCategory::WhereFrom, WHERE_FROM),
];

// ─── Classifier ──────────────────────────────────────────────────────────────

/// The set of categories a message hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordHits {
    hits: BTreeSet<KeywordCategory>,
}

impl KeywordHits {
    pub fn has(&self, category: KeywordCategory) -> bool {
        self.hits.contains(&category)
    }

    pub fn categories(&self) -> impl Iterator<Item = KeywordCategory> + '_ {
        self.hits.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> KeywordHits {
        let lowered = text.to_lowercase();
        let hits = TABLE
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| lowered.contains(p)))
            .map(|(category, _)| *category)
            .collect();
        KeywordHits { hits }
    }

    /// True when the text contains any phrase of one category.
    pub fn matches(&self, text: &str, category: KeywordCategory) -> bool {
        self.classify(text).has(category)
    }
}
