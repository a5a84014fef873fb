use super::types::{EntityMap, IntentKind};
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use regex::Regex;
use std::sync::LazyLock;

const ISO_DATE: &str = "%Y-%m-%d";

// ── Due-date patterns ───────────────────────────────────────────────────────

static RELATIVE_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(today|tomorrow)\b").expect("valid pattern"));
static DAY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .expect("valid pattern")
});
static SLASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid pattern"));
static DASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})-(\d{1,2})-(\d{4})\b").expect("valid pattern"));
static IN_N_UNITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bin\s+(\d+)\s+(days?|weeks?|months?)\b").expect("valid pattern"));
static RELATIVE_PERIOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(next|this)\s+(week|month|year)\b").expect("valid pattern"));

// ── Other entity patterns ───────────────────────────────────────────────────

static LIFE_AREAS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\b(health|fitness|exercise|diet|wellness)\b", "Health"),
        (r"\b(career|work|job|professional|business)\b", "Career"),
        (
            r"\b(family|friends|relationship|social|love)\b",
            "Relationships",
        ),
        (r"\b(money|finance|financial|budget|savings?)\b", "Finance"),
        (
            r"\b(personal|self|growth|development|learning)\b",
            "Personal",
        ),
        (
            r"\b(education|study|school|university|course)\b",
            "Education",
        ),
        (
            r"\b(hobby|hobbies|fun|entertainment|leisure)\b",
            "Recreation",
        ),
        (
            r"\b(spiritual|religion|meditation|mindfulness)\b",
            "Spiritual",
        ),
    ]
    .into_iter()
    .map(|(pattern, area)| (Regex::new(pattern).expect("valid pattern"), area))
    .collect()
});

static PRIORITIES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\b(urgent|critical|asap|immediately)\b", "high"),
        (r"\b(important|high)\s+priority\b", "high"),
        (r"\b(low|minor)\b", "low"),
        (r"\b(normal|medium|regular)\b", "medium"),
    ]
    .into_iter()
    .map(|(pattern, level)| (Regex::new(pattern).expect("valid pattern"), level))
    .collect()
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+)\s+(minutes?|mins?|hours?|days?)\b").expect("valid pattern")
});

// ── Title extraction ────────────────────────────────────────────────────────

static TITLE_PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(create|add|make|new|set)\s+(a\s+)?(goal|task|project)\s*(is|to|:|called)?\s*",
        r"\bi\s+(want|need)\s+to\s+",
        r"\bmy\s+(goal|task)\s+is\s+",
        r"\btodo\s*:\s*",
        r"\bremind\s+me\s+to\s+",
    ]
    .into_iter()
    .map(|pattern| Regex::new(&format!("(?i){pattern}")).expect("valid pattern"))
    .collect()
});

static TITLE_TEMPORAL_TAIL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\s+(today|tomorrow|monday|tuesday|wednesday|thursday|friday|saturday|sunday)\s*$",
        r"\s+in\s+\d+\s+(days?|weeks?|months?)\s*$",
        r"\s+(next|this)\s+(week|month|year)\s*$",
        r"\s+(on|by)\s+\d{1,2}[/-]\d{1,2}[/-]\d{4}\s*$",
    ]
    .into_iter()
    .map(|pattern| Regex::new(&format!("(?i){pattern}")).expect("valid pattern"))
    .collect()
});

static EDGE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\w]+|[^\w]+$").expect("valid pattern"));

// ── Parsers ─────────────────────────────────────────────────────────────────

fn parse_relative_day(word: &str, today: NaiveDate) -> String {
    match word {
        "today" => today.format(ISO_DATE).to_string(),
        "tomorrow" => (today + Duration::days(1)).format(ISO_DATE).to_string(),
        other => other.to_string(),
    }
}

/// Next occurrence of the named weekday, strictly in the future.
fn parse_day_name(name: &str, today: NaiveDate) -> String {
    let Ok(target) = name.parse::<Weekday>() else {
        return name.to_string();
    };

    let current = today.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    let mut days_ahead = wanted - current;
    if days_ahead <= 0 {
        days_ahead += 7;
    }

    (today + Duration::days(days_ahead))
        .format(ISO_DATE)
        .to_string()
}

/// `M/D/YYYY` or `M-D-YYYY`, normalized to ISO. Impossible dates fall back
/// to the raw matched text.
fn parse_numeric_date(caps: &regex::Captures<'_>) -> String {
    let raw = caps[0].to_string();
    let (Ok(month), Ok(day), Ok(year)) = (
        caps[1].parse::<u32>(),
        caps[2].parse::<u32>(),
        caps[3].parse::<i32>(),
    ) else {
        return raw;
    };

    NaiveDate::from_ymd_opt(year, month, day)
        .map(|date| date.format(ISO_DATE).to_string())
        .unwrap_or(raw)
}

fn parse_relative_duration(caps: &regex::Captures<'_>, today: NaiveDate) -> String {
    let raw = caps[0].to_string();
    let Ok(amount) = caps[1].parse::<i64>() else {
        return raw;
    };

    let days = if caps[2].starts_with("day") {
        amount
    } else if caps[2].starts_with("week") {
        amount * 7
    } else {
        // Months are approximated at 30 days.
        amount * 30
    };

    (today + Duration::days(days)).format(ISO_DATE).to_string()
}

fn parse_relative_period(caps: &regex::Captures<'_>, today: NaiveDate) -> String {
    let next = &caps[1] == "next";
    let target = match &caps[2] {
        "week" => {
            if next {
                today + Duration::days(7)
            } else {
                // Snap to the end of the current week (Sunday).
                today + Duration::days(6 - today.weekday().num_days_from_monday() as i64)
            }
        }
        "month" => {
            if next {
                let (year, month) = if today.month() == 12 {
                    (today.year() + 1, 1)
                } else {
                    (today.year(), today.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(today)
            } else {
                NaiveDate::from_ymd_opt(today.year(), today.month(), 28).unwrap_or(today)
            }
        }
        _ => {
            if next {
                NaiveDate::from_ymd_opt(today.year() + 1, 1, 1).unwrap_or(today)
            } else {
                NaiveDate::from_ymd_opt(today.year(), 12, 31).unwrap_or(today)
            }
        }
    };

    target.format(ISO_DATE).to_string()
}

fn extract_due_date(message: &str, today: NaiveDate) -> Option<String> {
    if let Some(caps) = RELATIVE_DAY.captures(message) {
        return Some(parse_relative_day(&caps[1], today));
    }
    if let Some(caps) = DAY_NAME.captures(message) {
        return Some(parse_day_name(&caps[1], today));
    }
    if let Some(caps) = SLASH_DATE.captures(message) {
        return Some(parse_numeric_date(&caps));
    }
    if let Some(caps) = DASH_DATE.captures(message) {
        return Some(parse_numeric_date(&caps));
    }
    if let Some(caps) = IN_N_UNITS.captures(message) {
        return Some(parse_relative_duration(&caps, today));
    }
    if let Some(caps) = RELATIVE_PERIOD.captures(message) {
        return Some(parse_relative_period(&caps, today));
    }
    None
}

/// Title for `create_*` intents: the message with intent-keyword prefixes and
/// trailing date expressions stripped. Rejected when shorter than 3 chars.
pub fn extract_title(message: &str) -> Option<String> {
    let mut cleaned = message.to_string();
    for pattern in TITLE_PREFIXES.iter() {
        cleaned = pattern.replace_all(&cleaned, "").trim().to_string();
    }
    for pattern in TITLE_TEMPORAL_TAIL.iter() {
        cleaned = pattern.replace_all(&cleaned, "").trim().to_string();
    }
    let cleaned = EDGE_PUNCTUATION.replace_all(&cleaned, "").trim().to_string();

    (cleaned.len() > 2).then_some(cleaned)
}

/// Extract every supported entity from the message, first-match-wins per
/// entity type. `today` is injected so date math is testable.
pub fn extract_entities(message: &str, intent: IntentKind, today: NaiveDate) -> EntityMap {
    let lowered = message.to_lowercase();
    let mut entities = EntityMap::new();

    if let Some(due_date) = extract_due_date(&lowered, today) {
        entities.insert("due_date".into(), due_date.into());
    }

    for (pattern, area) in LIFE_AREAS.iter() {
        if pattern.is_match(&lowered) {
            entities.insert("life_area".into(), (*area).into());
            break;
        }
    }

    for (pattern, level) in PRIORITIES.iter() {
        if pattern.is_match(&lowered) {
            entities.insert("priority".into(), (*level).into());
            break;
        }
    }

    if let Some(caps) = DURATION.captures(&lowered) {
        entities.insert(
            "duration".into(),
            format!("{} {}", &caps[1], &caps[2]).into(),
        );
    }

    if intent.is_create()
        && let Some(title) = extract_title(message)
    {
        entities.insert("title".into(), title.into());
    }

    entities
}

/// Entry point using the system clock.
pub fn extract_entities_now(message: &str, intent: IntentKind) -> EntityMap {
    extract_entities(message, intent, Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wednesday() -> NaiveDate {
        // 2025-06-18 was a Wednesday.
        NaiveDate::from_ymd_opt(2025, 6, 18).unwrap()
    }

    #[test]
    fn tomorrow_resolves_to_next_day() {
        let entities =
            extract_entities("remind me to stretch tomorrow", IntentKind::CreateTask, wednesday());
        assert_eq!(entities["due_date"], "2025-06-19");
    }

    #[test]
    fn weekday_is_strictly_future() {
        // Wednesday mentioned on a Wednesday must land next week.
        let entities = extract_entities("book dentist for wednesday", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-06-25");

        let entities = extract_entities("call mom on friday", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-06-20");
    }

    #[test]
    fn numeric_dates_normalize_to_iso() {
        let entities = extract_entities("due 7/4/2025", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-07-04");

        let entities = extract_entities("due 12-31-2025", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-12-31");
    }

    #[test]
    fn impossible_numeric_date_keeps_raw_text() {
        let entities = extract_entities("due 13/45/2025", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "13/45/2025");
    }

    #[test]
    fn in_n_units_adds_to_today() {
        let entities = extract_entities("finish in 3 days", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-06-21");

        let entities = extract_entities("finish in 2 weeks", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-07-02");

        // Months approximate to 30 days.
        let entities = extract_entities("finish in 1 month", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-07-18");
    }

    #[test]
    fn relative_periods_snap_to_boundaries() {
        let entities = extract_entities("sometime next week", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-06-25");

        let entities = extract_entities("by this week", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-06-22");

        let entities = extract_entities("due next month", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-07-01");

        let entities = extract_entities("before this year ends", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-12-31");
    }

    #[test]
    fn first_due_date_pattern_wins() {
        let entities =
            extract_entities("tomorrow or next week, whichever", IntentKind::Unknown, wednesday());
        assert_eq!(entities["due_date"], "2025-06-19");
    }

    #[test]
    fn life_area_uses_keyword_lexicon() {
        let entities = extract_entities("improve my fitness", IntentKind::Unknown, wednesday());
        assert_eq!(entities["life_area"], "Health");

        let entities = extract_entities("sort out my budget", IntentKind::Unknown, wednesday());
        assert_eq!(entities["life_area"], "Finance");
    }

    #[test]
    fn priority_synonyms_map_to_levels() {
        let entities = extract_entities("this is urgent", IntentKind::Unknown, wednesday());
        assert_eq!(entities["priority"], "high");

        let entities = extract_entities("minor cleanup", IntentKind::Unknown, wednesday());
        assert_eq!(entities["priority"], "low");
    }

    #[test]
    fn duration_is_a_free_form_string() {
        let entities = extract_entities("block 45 minutes", IntentKind::Unknown, wednesday());
        assert_eq!(entities["duration"], "45 minutes");
    }

    #[test]
    fn title_strips_intent_prefix_and_date_tail() {
        let entities = extract_entities(
            "Remind me to buy groceries tomorrow",
            IntentKind::CreateTask,
            wednesday(),
        );
        assert_eq!(entities["title"], "buy groceries");
        assert_eq!(entities["due_date"], "2025-06-19");
    }

    #[test]
    fn title_strips_create_goal_prefix() {
        let title = extract_title("Create a goal to run a marathon").unwrap();
        assert_eq!(title, "run a marathon");
    }

    #[test]
    fn too_short_titles_are_rejected() {
        assert!(extract_title("add a task: ok").is_none());
    }

    #[test]
    fn title_only_for_create_intents() {
        let entities = extract_entities(
            "Remind me to buy groceries",
            IntentKind::GetAdvice,
            wednesday(),
        );
        assert!(!entities.contains_key("title"));
    }
}
