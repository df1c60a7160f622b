//! Typed view of a vehicle-owner export.
//!
//! The source files label their columns in Chinese. Each label maps to one
//! canonical [`Column`]; anything else is carried through as an extra column.
//! Rows are held as [`Record`]s with named fields, so the cleaning stages
//! never look values up by label.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Fill value for missing text fields.
pub const MISSING_SENTINEL: &str = "N/A";

/// Cell values read as missing (after trimming).
const NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-NaN", "-nan", "<NA>", "N/A", "NA", "NULL", "NaN", "None",
    "n/a", "nan", "null",
];

/// Accepted layouts for the birthday column.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Output layout for dates.
const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d";

// ─────────────────────────────────────────────────────────────────────────────
// Columns
// ─────────────────────────────────────────────────────────────────────────────

/// Canonical columns of the owner table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    VehicleFrameNumber,
    Name,
    IdCardNumber,
    Gender,
    MobilePhone,
    Email,
    Province,
    City,
    Address,
    PostalCode,
    Birthday,
    Industry,
    MonthlySalary,
    MaritalStatus,
    Education,
    Brand,
    CarSeries,
    CarModel,
    Configuration,
    Colour,
    EngineNumber,
}

impl Column {
    /// Every column, in the order of the source export.
    pub const ALL: [Column; 21] = [
        Column::VehicleFrameNumber,
        Column::Name,
        Column::IdCardNumber,
        Column::Gender,
        Column::MobilePhone,
        Column::Email,
        Column::Province,
        Column::City,
        Column::Address,
        Column::PostalCode,
        Column::Birthday,
        Column::Industry,
        Column::MonthlySalary,
        Column::MaritalStatus,
        Column::Education,
        Column::Brand,
        Column::CarSeries,
        Column::CarModel,
        Column::Configuration,
        Column::Colour,
        Column::EngineNumber,
    ];

    /// Columns stripped from the cleaned output and routed to garbage.
    pub const UNWANTED: [Column; 2] = [Column::Configuration, Column::PostalCode];

    /// Columns whose combined values identify one owner.
    pub const IDENTITY: [Column; 3] = [Column::Name, Column::IdCardNumber, Column::EngineNumber];

    /// The label used in the source export.
    pub fn source_label(self) -> &'static str {
        match self {
            Column::VehicleFrameNumber => "车架号",
            Column::Name => "姓名",
            Column::IdCardNumber => "身份证",
            Column::Gender => "性别",
            Column::MobilePhone => "手机",
            Column::Email => "邮箱",
            Column::Province => "省",
            Column::City => "城市",
            Column::Address => "地址",
            Column::PostalCode => "邮编",
            Column::Birthday => "生日",
            Column::Industry => "行业",
            Column::MonthlySalary => "月薪",
            Column::MaritalStatus => "婚姻",
            Column::Education => "教育",
            Column::Brand => "BRAND",
            Column::CarSeries => "车系",
            Column::CarModel => "车型",
            Column::Configuration => "配置",
            Column::Colour => "颜色",
            Column::EngineNumber => "发动机号",
        }
    }

    /// The canonical identifier written to every output file.
    pub fn canonical(self) -> &'static str {
        match self {
            Column::VehicleFrameNumber => "vehicle_frame_number",
            Column::Name => "name",
            Column::IdCardNumber => "id_card_number",
            Column::Gender => "gender",
            Column::MobilePhone => "mobile_phone",
            Column::Email => "email",
            Column::Province => "province",
            Column::City => "city",
            Column::Address => "address",
            Column::PostalCode => "postal_code",
            Column::Birthday => "birthday",
            Column::Industry => "industry",
            Column::MonthlySalary => "monthly_salary",
            Column::MaritalStatus => "marital_status",
            Column::Education => "education",
            Column::Brand => "brand",
            Column::CarSeries => "car_series",
            Column::CarModel => "car_model",
            Column::Configuration => "configuration",
            Column::Colour => "colour",
            Column::EngineNumber => "engine_number",
        }
    }

    /// Resolves a header label. Source labels are renamed; canonical labels
    /// are accepted as-is so already-cleaned files resolve the same way.
    pub fn from_label(label: &str) -> Option<Column> {
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.source_label() == label || c.canonical() == label)
    }

    pub fn is_unwanted(self) -> bool {
        Column::UNWANTED.contains(&self)
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Column::Birthday => ColumnKind::Date,
            Column::MonthlySalary => ColumnKind::Number,
            _ => ColumnKind::Text,
        }
    }
}

/// Value type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Date,
    Number,
}

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

/// One header position after renaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Known(Column),
    Extra(String),
}

impl Slot {
    pub fn label(&self) -> &str {
        match self {
            Slot::Known(c) => c.canonical(),
            Slot::Extra(label) => label,
        }
    }
}

/// Column layout of an input file, resolved once from its header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    slots: Vec<Slot>,
}

impl Schema {
    /// Builds the schema from raw header labels. Labels are trimmed; a
    /// leading BOM must already be stripped.
    pub fn from_header<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let slots = labels
            .into_iter()
            .map(|raw| {
                let label = raw.trim();
                match Column::from_label(label) {
                    Some(column) => Slot::Known(column),
                    None => Slot::Extra(label.to_string()),
                }
            })
            .collect();
        Self { slots }
    }

    /// All input slots, in header order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn width(&self) -> usize {
        self.slots.len()
    }

    /// Position of a known column in the input row.
    pub fn position(&self, column: Column) -> Option<usize> {
        self.slots.iter().position(|s| *s == Slot::Known(column))
    }

    pub fn contains(&self, column: Column) -> bool {
        self.position(column).is_some()
    }

    pub fn has_unwanted(&self) -> bool {
        Column::UNWANTED.iter().any(|c| self.contains(*c))
    }

    /// Slots kept in the cleaned output: header order minus unwanted columns.
    pub fn output_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots
            .iter()
            .filter(|s| !matches!(s, Slot::Known(c) if c.is_unwanted()))
    }

    /// Header of the cleaned, snapshot and duplicate files.
    pub fn output_header(&self) -> Vec<String> {
        self.output_slots().map(|s| s.label().to_string()).collect()
    }

    /// Labels of the pass-through columns, in header order.
    pub fn extra_labels(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter_map(|s| match s {
                Slot::Extra(label) => Some(label.as_str()),
                Slot::Known(_) => None,
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Record
// ─────────────────────────────────────────────────────────────────────────────

/// One owner row after normalization.
///
/// Text fields are `None` only before [`Record::fill_missing`] runs.
/// `birthday` and `monthly_salary` stay `None` when missing.
/// A salary that is not a number is kept as text and treated like the other
/// text fields by [`Record::lowercase`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub vehicle_frame_number: Option<String>,
    pub name: Option<String>,
    pub id_card_number: Option<String>,
    pub gender: Option<String>,
    pub mobile_phone: Option<String>,
    pub email: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub industry: Option<String>,
    pub monthly_salary: Option<Salary>,
    pub marital_status: Option<String>,
    pub education: Option<String>,
    pub brand: Option<String>,
    pub car_series: Option<String>,
    pub car_model: Option<String>,
    pub colour: Option<String>,
    pub engine_number: Option<String>,
    /// Pass-through columns, aligned with [`Schema::extra_labels`].
    pub extras: Vec<Option<String>>,
}

/// Identity of an owner, compared exactly.
pub type IdentityKey = (Option<String>, Option<String>, Option<String>);

impl Record {
    /// Text field backing a column. `None` for unwanted, date and numeric
    /// columns.
    pub fn text(&self, column: Column) -> Option<&Option<String>> {
        match column {
            Column::VehicleFrameNumber => Some(&self.vehicle_frame_number),
            Column::Name => Some(&self.name),
            Column::IdCardNumber => Some(&self.id_card_number),
            Column::Gender => Some(&self.gender),
            Column::MobilePhone => Some(&self.mobile_phone),
            Column::Email => Some(&self.email),
            Column::Province => Some(&self.province),
            Column::City => Some(&self.city),
            Column::Address => Some(&self.address),
            Column::Industry => Some(&self.industry),
            Column::MaritalStatus => Some(&self.marital_status),
            Column::Education => Some(&self.education),
            Column::Brand => Some(&self.brand),
            Column::CarSeries => Some(&self.car_series),
            Column::CarModel => Some(&self.car_model),
            Column::Colour => Some(&self.colour),
            Column::EngineNumber => Some(&self.engine_number),
            Column::PostalCode
            | Column::Configuration
            | Column::Birthday
            | Column::MonthlySalary => None,
        }
    }

    pub fn text_mut(&mut self, column: Column) -> Option<&mut Option<String>> {
        match column {
            Column::VehicleFrameNumber => Some(&mut self.vehicle_frame_number),
            Column::Name => Some(&mut self.name),
            Column::IdCardNumber => Some(&mut self.id_card_number),
            Column::Gender => Some(&mut self.gender),
            Column::MobilePhone => Some(&mut self.mobile_phone),
            Column::Email => Some(&mut self.email),
            Column::Province => Some(&mut self.province),
            Column::City => Some(&mut self.city),
            Column::Address => Some(&mut self.address),
            Column::Industry => Some(&mut self.industry),
            Column::MaritalStatus => Some(&mut self.marital_status),
            Column::Education => Some(&mut self.education),
            Column::Brand => Some(&mut self.brand),
            Column::CarSeries => Some(&mut self.car_series),
            Column::CarModel => Some(&mut self.car_model),
            Column::Colour => Some(&mut self.colour),
            Column::EngineNumber => Some(&mut self.engine_number),
            Column::PostalCode
            | Column::Configuration
            | Column::Birthday
            | Column::MonthlySalary => None,
        }
    }

    fn text_fields_mut(&mut self) -> impl Iterator<Item = &mut Option<String>> + '_ {
        [
            &mut self.vehicle_frame_number,
            &mut self.name,
            &mut self.id_card_number,
            &mut self.gender,
            &mut self.mobile_phone,
            &mut self.email,
            &mut self.province,
            &mut self.city,
            &mut self.address,
            &mut self.industry,
            &mut self.marital_status,
            &mut self.education,
            &mut self.brand,
            &mut self.car_series,
            &mut self.car_model,
            &mut self.colour,
            &mut self.engine_number,
        ]
        .into_iter()
        .chain(self.extras.iter_mut())
    }

    /// Replaces every missing text value with [`MISSING_SENTINEL`].
    pub fn fill_missing(&mut self) {
        for field in self.text_fields_mut() {
            if field.is_none() {
                *field = Some(MISSING_SENTINEL.to_string());
            }
        }
    }

    /// Lowercases every text value, sentinel included.
    pub fn lowercase(&mut self) {
        for value in self.text_fields_mut().flatten() {
            *value = value.to_lowercase();
        }
        if let Some(Salary::Text(text)) = &mut self.monthly_salary {
            *text = text.to_lowercase();
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        (
            self.name.clone(),
            self.id_card_number.clone(),
            self.engine_number.clone(),
        )
    }

    /// Serializes the record in the schema's output column order.
    pub fn to_row(&self, schema: &Schema) -> Vec<String> {
        let mut extras = self.extras.iter();
        schema
            .output_slots()
            .map(|slot| match slot {
                Slot::Known(Column::Birthday) => self
                    .birthday
                    .map(|d| d.format(DATE_OUTPUT_FORMAT).to_string())
                    .unwrap_or_default(),
                Slot::Known(Column::MonthlySalary) => self
                    .monthly_salary
                    .as_ref()
                    .map(Salary::to_string)
                    .unwrap_or_default(),
                Slot::Known(column) => self
                    .text(*column)
                    .and_then(|v| v.clone())
                    .unwrap_or_default(),
                Slot::Extra(_) => extras.next().cloned().flatten().unwrap_or_default(),
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cell parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Trims a raw cell; `None` when the result is a null marker.
pub fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if NULL_MARKERS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A non-missing cell that does not parse as its column's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCell;

/// Parses a birthday cell. `Ok(None)` for missing values.
pub fn parse_date(raw: &str) -> Result<Option<NaiveDate>, InvalidCell> {
    let Some(value) = clean_text(raw) else {
        return Ok(None);
    };
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&value, fmt) {
            return Ok(Some(date));
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&value, fmt) {
            return Ok(Some(dt.date()));
        }
    }
    Err(InvalidCell)
}

/// A salary cell: numeric when it parses, otherwise the trimmed text
/// (`面议`, `8000-10000`).
#[derive(Debug, Clone, PartialEq)]
pub enum Salary {
    Number(f64),
    Text(String),
}

impl fmt::Display for Salary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Salary::Number(n) => write!(f, "{}", n),
            Salary::Text(t) => f.write_str(t),
        }
    }
}

/// Parses a salary cell. Never fails; `None` for missing values.
pub fn parse_salary(raw: &str) -> Option<Salary> {
    let value = clean_text(raw)?;
    Some(match value.parse::<f64>() {
        Ok(n) => Salary::Number(n),
        Err(_) => Salary::Text(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_labels_resolve_to_canonical_columns() {
        assert_eq!(Column::from_label("车架号"), Some(Column::VehicleFrameNumber));
        assert_eq!(Column::from_label("BRAND"), Some(Column::Brand));
        assert_eq!(Column::from_label("发动机号"), Some(Column::EngineNumber));
        assert_eq!(Column::from_label("engine_number"), Some(Column::EngineNumber));
        assert_eq!(Column::from_label("备注"), None);
    }

    #[test]
    fn every_column_has_distinct_labels() {
        for (i, a) in Column::ALL.iter().enumerate() {
            for b in &Column::ALL[i + 1..] {
                assert_ne!(a.source_label(), b.source_label());
                assert_ne!(a.canonical(), b.canonical());
            }
        }
    }

    #[test]
    fn schema_drops_unwanted_from_output_header() {
        let schema = Schema::from_header(vec!["姓名", "配置", "邮箱", "备注", "邮编"]);
        assert!(schema.has_unwanted());
        assert_eq!(schema.output_header(), vec!["name", "email", "备注"]);
        assert_eq!(schema.extra_labels(), vec!["备注"]);
        assert_eq!(schema.position(Column::Email), Some(2));
    }

    #[test]
    fn null_markers_read_as_missing() {
        assert_eq!(clean_text("  "), None);
        assert_eq!(clean_text("NULL"), None);
        assert_eq!(clean_text(" nan "), None);
        assert_eq!(clean_text("  Zhang San "), Some("Zhang San".to_string()));
    }

    #[test]
    fn dates_parse_in_common_layouts() {
        let expected = NaiveDate::from_ymd_opt(1988, 3, 9);
        assert_eq!(parse_date("1988-03-09"), Ok(expected));
        assert_eq!(parse_date("1988/03/09"), Ok(expected));
        assert_eq!(parse_date("19880309"), Ok(expected));
        assert_eq!(parse_date("1988-03-09 00:00:00"), Ok(expected));
        assert_eq!(parse_date(""), Ok(None));
        assert_eq!(parse_date("yesterday"), Err(InvalidCell));
    }

    #[test]
    fn salary_keeps_text_that_is_not_a_number() {
        assert_eq!(parse_salary("8000"), Some(Salary::Number(8000.0)));
        assert_eq!(parse_salary(" 面议 "), Some(Salary::Text("面议".into())));
        assert_eq!(
            parse_salary("8000-10000"),
            Some(Salary::Text("8000-10000".into()))
        );
        assert_eq!(parse_salary("NaN"), None);
        assert_eq!(parse_salary(" "), None);
        assert_eq!(Salary::Number(5000.5).to_string(), "5000.5");
    }

    #[test]
    fn text_salary_is_lowercased() {
        let mut record = Record {
            monthly_salary: parse_salary("Negotiable"),
            ..Default::default()
        };
        record.lowercase();
        assert_eq!(record.monthly_salary, Some(Salary::Text("negotiable".into())));
    }

    #[test]
    fn fill_then_lowercase_touches_text_only() {
        let mut record = Record {
            name: Some("Li LEI".into()),
            birthday: NaiveDate::from_ymd_opt(1990, 1, 2),
            extras: vec![None],
            ..Default::default()
        };
        record.fill_missing();
        assert_eq!(record.email.as_deref(), Some(MISSING_SENTINEL));
        assert_eq!(record.extras, vec![Some(MISSING_SENTINEL.to_string())]);
        assert_eq!(record.monthly_salary, None);

        record.lowercase();
        assert_eq!(record.name.as_deref(), Some("li lei"));
        assert_eq!(record.email.as_deref(), Some("n/a"));
    }

    #[test]
    fn to_row_follows_output_order() {
        let schema = Schema::from_header(vec!["生日", "姓名", "备注", "月薪", "配置"]);
        let record = Record {
            name: Some("wang".into()),
            birthday: NaiveDate::from_ymd_opt(1975, 12, 1),
            monthly_salary: Some(Salary::Number(5000.0)),
            extras: vec![Some("vip".into())],
            ..Default::default()
        };
        assert_eq!(
            record.to_row(&schema),
            vec!["1975-12-01", "wang", "vip", "5000"]
        );
    }
}
