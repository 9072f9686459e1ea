use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::app::{Chapter, Microsection, Section, Subject};
use crate::command::ContentType;

/// Minimum skim score for a fuzzy subject match.
pub const FUZZY_THRESHOLD: i64 = 30;

const LEARN_PREFIX: &str = "/learn";

/// Spoken destination keywords and the routes they open.
pub const DESTINATIONS: &[(&str, &str)] = &[
    ("home", "/"),
    ("dashboard", "/dashboard"),
    ("subjects", LEARN_PREFIX),
    ("library", LEARN_PREFIX),
    ("learn", LEARN_PREFIX),
    ("lessons", LEARN_PREFIX),
    ("settings", "/settings"),
    ("profile", "/profile"),
    ("braille", "/braille"),
    ("story", "/story-mode"),
    ("story mode", "/story-mode"),
    ("quiz", "/quiz"),
];

/// Maps a destination keyword to a route. Anything starting with `/` is taken as a route.
pub fn destination_route(destination: &str) -> Option<String> {
    let destination = destination.trim();
    if destination.starts_with('/') {
        return Some(destination.to_string());
    }
    let key = destination.to_lowercase().replace(['-', '_'], " ");
    let key = key.trim_start_matches("the ").trim();
    DESTINATIONS
        .iter()
        .find(|(keyword, _)| *keyword == key)
        .map(|(_, route)| route.to_string())
}

pub fn subject_route(slug: &str) -> String {
    format!("{}/{}", LEARN_PREFIX, slug)
}

pub fn chapter_route(slug: &str, chapter_id: &str) -> String {
    format!("{}/{}/{}", LEARN_PREFIX, slug, chapter_id)
}

pub fn item_route(slug: &str, chapter_id: &str, item_id: &str) -> String {
    format!("{}/{}/{}/{}", LEARN_PREFIX, slug, chapter_id, item_id)
}

/// The subject slug of a `/learn/{slug}/...` route.
pub fn subject_from_route(route: &str) -> Option<&str> {
    route
        .strip_prefix(LEARN_PREFIX)?
        .strip_prefix('/')?
        .split(['/', '?', '#'])
        .next()
        .filter(|slug| !slug.is_empty())
}

pub struct SubjectResolver {
    matcher: SkimMatcherV2,
}

impl Default for SubjectResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SubjectResolver {
    pub fn new() -> Self {
        Self {
            matcher: SkimMatcherV2::default(),
        }
    }

    /// Picks a subject by slug, then name, then fuzzy name, then the
    /// subject of `current_route`, then the only subject if there is one.
    pub fn resolve<'a>(
        &self,
        subjects: &'a [Subject],
        query: Option<&str>,
        current_route: Option<&str>,
    ) -> Option<&'a Subject> {
        if let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) {
            if let Some(subject) = self.by_query(subjects, query) {
                return Some(subject);
            }
            tracing::debug!("no subject matches {:?}, trying context", query);
        }

        if let Some(slug) = current_route.and_then(subject_from_route) {
            if let Some(subject) = subjects.iter().find(|s| s.slug == slug) {
                return Some(subject);
            }
        }

        match subjects {
            [only] => Some(only),
            _ => None,
        }
    }

    fn by_query<'a>(&self, subjects: &'a [Subject], query: &str) -> Option<&'a Subject> {
        let query_lower = query.to_lowercase();
        let slug_query = query_lower.replace(' ', "-");

        subjects
            .iter()
            .find(|s| s.slug.to_lowercase() == slug_query)
            .or_else(|| subjects.iter().find(|s| s.name.to_lowercase() == query_lower))
            .or_else(|| {
                subjects.iter().find(|s| {
                    let name = s.name.to_lowercase();
                    name.contains(&query_lower) || query_lower.contains(&name)
                })
            })
            .or_else(|| {
                subjects
                    .iter()
                    .filter_map(|s| {
                        let score = self.matcher.fuzzy_match(&s.name.to_lowercase(), &query_lower)?;
                        (score > FUZZY_THRESHOLD).then_some((score, s))
                    })
                    .max_by_key(|(score, _)| *score)
                    .map(|(_, s)| s)
            })
    }
}

/// The `ordinal`-th chapter (1-based) by sort key.
pub fn chapter_by_ordinal(chapters: &[Chapter], ordinal: u32) -> Option<&Chapter> {
    let mut sorted: Vec<&Chapter> = chapters.iter().collect();
    sorted.sort_by_key(|c| c.order);
    sorted.into_iter().nth((ordinal as usize).checked_sub(1)?)
}

/// Finds a microsection in a chapter tree.
///
/// `lesson` picks a section by 1-based sort position; `content_type` filters
/// microsections. With neither, the first item of the chapter is returned.
pub fn resolve_item(sections: &[Section], lesson: Option<u32>, content_type: Option<ContentType>) -> Option<&Microsection> {
    let mut sorted: Vec<&Section> = sections.iter().collect();
    sorted.sort_by_key(|s| s.order);

    let scope: Vec<&Section> = match lesson {
        Some(ordinal) => vec![*sorted.get((ordinal as usize).checked_sub(1)?)?],
        None => sorted,
    };

    scope
        .into_iter()
        .flat_map(|section| {
            let mut items: Vec<&Microsection> = section.microsections.iter().collect();
            items.sort_by_key(|m| m.order);
            items
        })
        .find(|item| content_type.is_none_or(|ct| item.content_type == ct))
}
