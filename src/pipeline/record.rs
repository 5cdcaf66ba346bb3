//! Document records: the structured data one synthetic lab report is made of.
//!
//! The pipeline treats the producer as a black box behind [`RecordProducer`];
//! it only needs a serialisable [`DocumentRecord`] per job. The bundled
//! [`RandomLabReportProducer`] draws Russian-language patient and analyte data
//! so the default template yields realistic Cyrillic documents.

use chrono::{Duration, Local};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Numeric reference interval of an analyte, rendered as `low–high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceInterval {
    pub low: f64,
    pub high: f64,
}

impl ReferenceInterval {
    pub fn is_valid(&self) -> bool {
        self.low.is_finite() && self.high.is_finite() && self.low < self.high
    }
}

/// One row of the analyte table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyteRow {
    pub name: String,
    pub value: String,
    pub unit: String,
    /// Display form of the reference, e.g. `4.1–6.0`.
    pub reference: String,
    #[serde(default)]
    pub comment: String,
    /// Set for numeric rows; `None` for free-text references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<ReferenceInterval>,
}

impl AnalyteRow {
    /// Build a numeric row; the display reference is derived from `interval`.
    pub fn numeric(
        name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        interval: ReferenceInterval,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: format_value(value),
            unit: unit.into(),
            reference: format!("{:.1}–{:.1}", interval.low, interval.high),
            comment: comment.into(),
            interval: Some(interval),
        }
    }
}

/// Fields that describe how a record was typeset; copied into the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderMetadata {
    pub font: String,
    pub font_size: u32,
    pub row_separator: bool,
}

/// A complete synthetic lab report.
///
/// Serialised field names are the names a template refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub patient_name: String,
    pub gender: String,
    pub age: u32,
    pub date_taken: String,
    pub date_received: String,
    pub doctor_date: String,
    pub print_date: String,
    pub clinic_name: String,
    pub clinic_city: String,
    pub analyses: Vec<AnalyteRow>,
    pub general_comment: String,
    pub executor_name: String,
    pub executor_position: String,
    pub site: String,
    pub main_font: String,
    pub row_separator: bool,
    pub font_size: u32,
}

/// A record that violates the data-model invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordViolation {
    NoAnalytes,
    DegenerateInterval { row: usize, name: String },
}

impl std::fmt::Display for RecordViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordViolation::NoAnalytes => write!(f, "record has no analyte rows"),
            RecordViolation::DegenerateInterval { row, name } => {
                write!(f, "analyte row {row} ('{name}') has low >= high")
            }
        }
    }
}

impl DocumentRecord {
    pub fn metadata(&self) -> RenderMetadata {
        RenderMetadata {
            font: self.main_font.clone(),
            font_size: self.font_size,
            row_separator: self.row_separator,
        }
    }

    /// Check the analyte invariants: at least one row, every numeric interval
    /// strictly increasing.
    pub fn validate(&self) -> Result<(), RecordViolation> {
        if self.analyses.is_empty() {
            return Err(RecordViolation::NoAnalytes);
        }
        for (i, row) in self.analyses.iter().enumerate() {
            if let Some(interval) = row.interval {
                if !interval.is_valid() {
                    return Err(RecordViolation::DegenerateInterval {
                        row: i,
                        name: row.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Produces one fresh record per call.
///
/// Implementations must be `Send + Sync`: the orchestrator calls `produce`
/// from many jobs at once.
pub trait RecordProducer: Send + Sync {
    fn produce(&self) -> DocumentRecord;
}

// ── Default producer ─────────────────────────────────────────────────────

/// (name, unit, low, high). Units are pre-escaped for LaTeX.
const ANALYTES: &[(&str, &str, f64, f64)] = &[
    ("Глюкоза", "ммоль/л", 4.1, 6.0),
    ("Креатинин", "мкмоль/л", 64.0, 104.0),
    ("ТТГ", "мЕд/л", 0.4, 4.0),
    ("Холестерин общий", "ммоль/л", 3.0, 5.2),
    ("Холестерин ЛПНП", "ммоль/л", 1.8, 3.3),
    ("Холестерин ЛПВП", "ммоль/л", 0.9, 2.0),
    ("Триглицериды", "ммоль/л", 0.5, 1.7),
    ("Витамин D", "нг/мл", 20.0, 100.0),
    ("Ферритин", "нг/мл", 30.0, 400.0),
    ("Гемоглобин", "г/дл", 13.0, 17.5),
    ("Эритроциты", "10\\^{}12/л", 4.0, 5.5),
    ("Лейкоциты", "10\\^{}9/л", 4.0, 9.0),
    ("Нейтрофилы", "\\%", 48.0, 78.0),
    ("Лимфоциты", "\\%", 19.0, 37.0),
    ("Моноциты", "\\%", 3.0, 11.0),
    ("Эозинофилы", "\\%", 0.5, 5.0),
    ("Базофилы", "\\%", 0.0, 1.0),
    ("Мочевина", "ммоль/л", 2.5, 8.3),
    ("Кальций общий", "ммоль/л", 2.2, 2.6),
    ("Магний", "ммоль/л", 0.7, 1.1),
    ("С-реактивный белок", "мг/л", 0.0, 5.0),
    ("Альбумин", "г/л", 35.0, 50.0),
    ("Билирубин общий", "мкмоль/л", 3.4, 17.1),
];

const COMMENTS: &[&str] = &[
    "в норме",
    "повышен",
    "ниже нормы",
    "чуть выше нормы",
    "см. примечание",
    "рекомендуется повторное исследование",
    "",
    "значение временно повышено, повторно через 2 недели",
    "значение может быть искажено после приема пищи",
    "рекомендуется консультация профильного специалиста",
    "следует контролировать динамику показателя в течение месяца",
    "обратите внимание на возможное влияние лекарственных средств",
    "результат может быть неверным при лабораторной ошибке",
];

const GENERAL_COMMENTS: &[&str] = &[
    "",
    "Результаты в пределах нормы.",
    "Рекомендовано повторное обследование через 6 месяцев.",
];

const FONTS: &[&str] = &[
    "DejaVu Sans",
    "Liberation Sans",
    "Arial",
    "PT Sans",
    "Times New Roman",
];

const FONT_SIZES: &[u32] = &[10, 11, 12, 13];

// (male, female) forms.
const SURNAMES: &[(&str, &str)] = &[
    ("Иванов", "Иванова"),
    ("Смирнов", "Смирнова"),
    ("Кузнецов", "Кузнецова"),
    ("Попов", "Попова"),
    ("Соколов", "Соколова"),
    ("Лебедев", "Лебедева"),
    ("Новиков", "Новикова"),
    ("Морозов", "Морозова"),
    ("Волков", "Волкова"),
    ("Павлов", "Павлова"),
];

const MALE_NAMES: &[&str] = &["Александр", "Дмитрий", "Максим", "Сергей", "Андрей", "Илья"];
const FEMALE_NAMES: &[&str] = &["Анна", "Мария", "Елена", "Ольга", "Татьяна", "Наталья"];

// (male, female) patronymics.
const PATRONYMICS: &[(&str, &str)] = &[
    ("Александрович", "Александровна"),
    ("Дмитриевич", "Дмитриевна"),
    ("Сергеевич", "Сергеевна"),
    ("Игоревич", "Игоревна"),
    ("Викторович", "Викторовна"),
];

const CLINICS: &[&str] = &[
    "ООО «Лаборатория Здоровье»",
    "АО «МедТест»",
    "ООО «Клиника Гемотест-Плюс»",
    "ООО «ДиаЛаб»",
    "ЗАО «Центр Диагностики»",
];

const CITIES: &[&str] = &[
    "Москва",
    "Санкт-Петербург",
    "Новосибирск",
    "Екатеринбург",
    "Казань",
    "Нижний Новгород",
];

const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";
const DATE_FORMAT: &str = "%d.%m.%Y";

/// Random Russian-language lab reports with 5–10 analyte rows.
#[derive(Debug, Clone)]
pub struct RandomLabReportProducer {
    pub min_rows: usize,
    pub max_rows: usize,
    pub site: String,
}

impl Default for RandomLabReportProducer {
    fn default() -> Self {
        Self {
            min_rows: 5,
            max_rows: 10,
            site: "www.neymark-labtracker.com".to_string(),
        }
    }
}

impl RecordProducer for RandomLabReportProducer {
    fn produce(&self) -> DocumentRecord {
        let mut rng = rand::thread_rng();

        let male = rng.gen_bool(0.5);
        let gender = if male { "Муж" } else { "Жен" };
        let patient_name = random_person(&mut rng, male).to_uppercase();
        let executor_name = random_person(&mut rng, false);

        let max_rows = self.max_rows.max(self.min_rows).max(1);
        let num_rows = rng.gen_range(self.min_rows.max(1)..=max_rows);

        let base = Local::now() - Duration::minutes(rng.gen_range(0..30 * 24 * 60));
        let taken = base - Duration::days(rng.gen_range(0..=5));
        let received = taken + Duration::hours(rng.gen_range(2..=8));
        let doctor = received + Duration::hours(rng.gen_range(10..=20));
        let printed = doctor + Duration::hours(2);

        DocumentRecord {
            patient_name,
            gender: gender.to_string(),
            age: rng.gen_range(18..=80),
            date_taken: taken.format(DATE_TIME_FORMAT).to_string(),
            date_received: received.format(DATE_TIME_FORMAT).to_string(),
            doctor_date: doctor.format(DATE_TIME_FORMAT).to_string(),
            print_date: printed.format(DATE_FORMAT).to_string(),
            clinic_name: pick(&mut rng, CLINICS).to_string(),
            clinic_city: pick(&mut rng, CITIES).to_string(),
            analyses: random_rows(&mut rng, num_rows),
            general_comment: pick(&mut rng, GENERAL_COMMENTS).to_string(),
            executor_name,
            executor_position: "врач клинической лабораторной диагностики".to_string(),
            site: self.site.clone(),
            main_font: pick(&mut rng, FONTS).to_string(),
            row_separator: rng.gen_bool(0.7),
            font_size: *FONT_SIZES.choose(&mut rng).unwrap_or(&11),
        }
    }
}

/// Draw `n` distinct analytes (capped at the table size) with values spread
/// ±20 % around the reference interval.
pub fn random_rows<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<AnalyteRow> {
    ANALYTES
        .choose_multiple(rng, n.min(ANALYTES.len()))
        .map(|&(name, unit, low, high)| {
            let value = rng.gen_range(low * 0.8..=high * 1.2);
            let comment = if rng.gen_bool(0.6) {
                pick(rng, COMMENTS)
            } else {
                ""
            };
            AnalyteRow::numeric(
                name,
                (value * 100.0).round() / 100.0,
                unit,
                ReferenceInterval { low, high },
                comment,
            )
        })
        .collect()
}

fn random_person<R: Rng + ?Sized>(rng: &mut R, male: bool) -> String {
    let (surname_m, surname_f) = SURNAMES.choose(rng).copied().unwrap_or(("Иванов", "Иванова"));
    let (patronymic_m, patronymic_f) = PATRONYMICS
        .choose(rng)
        .copied()
        .unwrap_or(("Сергеевич", "Сергеевна"));
    if male {
        format!("{} {} {}", surname_m, pick(rng, MALE_NAMES), patronymic_m)
    } else {
        format!("{} {} {}", surname_f, pick(rng, FEMALE_NAMES), patronymic_f)
    }
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or("")
}

/// Trim trailing zeros the way a lab printout shows values: `5.2`, `64`.
fn format_value(value: f64) -> String {
    let s = format!("{:.2}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}
