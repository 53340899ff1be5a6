// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::path::PathBuf;

use anyhow::{Context, Result};
use katalog_app::{DatasetKind, Record};
use time::macros::format_description;
use time::{Date, Duration, Month};

const TITLES: [&str; 16] = [
    "Война и мир",
    "Анна Каренина",
    "Отцы и дети",
    "Дар",
    "Мёртвые души",
    "Бесы",
    "Идиот",
    "Обломов",
    "Евгений Онегин",
    "Герой нашего времени",
    "Мастер и Маргарита",
    "Тихий Дон",
    "Доктор Живаго",
    "Записки охотника",
    "Капитанская дочка",
    "Вишнёвый сад",
];

const AUTHORS: [&str; 10] = [
    "Толстой",
    "Тургенев",
    "Набоков",
    "Гоголь",
    "Достоевский",
    "Гончаров",
    "Пушкин",
    "Лермонтов",
    "Булгаков",
    "Ёлкин",
];

const GENRES: [&str; 6] = ["Роман", "Повесть", "Поэзия", "Драма", "Рассказ", "Эссе"];
const TOPICS: [&str; 8] = [
    "История",
    "Война",
    "Семья",
    "Религия",
    "Общество",
    "Любовь",
    "Природа",
    "Философия",
];

const CITIES: [&str; 8] = [
    "Москва",
    "Санкт-Петербург",
    "Казань",
    "Тверь",
    "Berlin",
    "Paris",
    "Рига",
    "Киев",
];
const PUBLISHERS: [&str; 6] = [
    "Эксмо",
    "АСТ",
    "Азбука",
    "Наука",
    "Художественная литература",
    "Ardis",
];
const STREETS: [&str; 8] = [
    "Ленина",
    "Садовая",
    "Пушкина",
    "Невский пр.",
    "Лесная",
    "Мира",
    "Гагарина",
    "Школьная",
];
const LIBRARY_NAMES: [&str; 6] = [
    "Central",
    "North",
    "Riverside",
    "Old Town",
    "University",
    "Children's",
];

const FIRST_NAMES: [&str; 10] = [
    "Иван", "Пётр", "Анна", "Мария", "Олег", "Елена", "Сергей", "Ольга", "Юрий", "Ирина",
];
const LAST_NAMES: [&str; 10] = [
    "Иванов", "Сидоров", "Петров", "Смирнов", "Кузнецов", "Попов", "Васильев", "Новиков",
    "Фёдоров", "Морозов",
];

const REFERENCE_YEAR: i32 = 2024;

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Every table a test catalog needs, keyed consistently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub libraries: Vec<Record>,
    pub genres: Vec<Record>,
    pub topics: Vec<Record>,
    pub books: Vec<Record>,
    pub readers: Vec<Record>,
    pub loans: Vec<Record>,
}

impl Catalog {
    pub fn dataset(&self, kind: DatasetKind) -> Vec<Record> {
        match kind {
            DatasetKind::Books => self.books.clone(),
            DatasetKind::Genres => self.genres.clone(),
            DatasetKind::Libraries => self.libraries.clone(),
            DatasetKind::Loans => self.loans.clone(),
            DatasetKind::Readers => self.readers.clone(),
            DatasetKind::Topics => self.topics.clone(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogFaker {
    rng: DeterministicRng,
    seed: u64,
}

impl CatalogFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
        }
    }

    pub const fn seed(&self) -> u64 {
        self.seed
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn library(&mut self, library_id: i64) -> Record {
        let name = LIBRARY_NAMES[(library_id.unsigned_abs() as usize) % LIBRARY_NAMES.len()];
        Record::new()
            .with("library_id", library_id)
            .with("name", name)
            .with("address", self.address())
    }

    pub fn genre(&mut self, genre_id: i64) -> Record {
        let name = GENRES[(genre_id.unsigned_abs() as usize) % GENRES.len()];
        Record::new().with("genre_id", genre_id).with("name", name)
    }

    pub fn topic(&mut self, topic_id: i64) -> Record {
        let name = TOPICS[(topic_id.unsigned_abs() as usize) % TOPICS.len()];
        Record::new().with("topic_id", topic_id).with("name", name)
    }

    pub fn book(&mut self, library: &Record, book_id: i64, genre: &Record) -> Record {
        Record::new()
            .with("title", self.pick(&TITLES))
            .with("author", self.pick(&AUTHORS))
            .with("book_id", book_id)
            .with("genre_id", genre.get("genre_id").cloned().unwrap_or_default())
            .with("library_id", library.get("library_id").cloned().unwrap_or_default())
            .with("publication_place", self.pick(&CITIES))
            .with("publication_year", self.int_range(1850, 2023))
            .with("publisher", self.pick(&PUBLISHERS))
            .with("quantity", self.int_range(0, 12))
            .with("library_name", library.text("name"))
            .with("genre_name", genre.text("name"))
    }

    pub fn reader(&mut self, reader_id: i64) -> Record {
        let full_name = format!("{} {}", self.pick(&LAST_NAMES), self.pick(&FIRST_NAMES));
        Record::new()
            .with("reader_id", reader_id)
            .with("full_name", full_name)
            .with("phone", self.phone())
            .with("address", self.address())
    }

    /// Loan row in the backend's shape: RFC 2822 dates and a marker string
    /// for books not yet returned.
    pub fn loan(&mut self, book: &Record, reader: &Record) -> Record {
        let issued = self.date_in_year(REFERENCE_YEAR);
        let due = issued + Duration::days(14);
        let returned = if self.int_n(2) == 0 {
            rfc2822_date(due - Duration::days(2))
        } else {
            UNRETURNED.to_owned()
        };
        Record::new()
            .with("library_id", book.get("library_id").cloned().unwrap_or_default())
            .with("library_name", book.text("library_name"))
            .with("book_id", book.get("book_id").cloned().unwrap_or_default())
            .with("book_title", book.text("title"))
            .with("reader_id", reader.get("reader_id").cloned().unwrap_or_default())
            .with("reader_name", reader.text("full_name"))
            .with("issue_date", rfc2822_date(issued))
            .with("due_date", rfc2822_date(due))
            .with("return_date", returned)
            .with("deposit", self.int_range(0, 500))
    }

    pub fn catalog(&mut self, libraries: i64, books_per_library: i64) -> Catalog {
        let mut catalog = Catalog {
            genres: (1..=4).map(|id| self.genre(id)).collect(),
            topics: (1..=5).map(|id| self.topic(id)).collect(),
            libraries: (1..=libraries).map(|id| self.library(id)).collect(),
            readers: (1..=6).map(|id| self.reader(id)).collect(),
            ..Catalog::default()
        };
        for library in catalog.libraries.clone() {
            for book_id in 1..=books_per_library {
                let genre = catalog.genres[self.int_n(catalog.genres.len())].clone();
                catalog.books.push(self.book(&library, book_id, &genre));
            }
        }
        for book in catalog.books.iter().step_by(2) {
            let reader = catalog.readers[self.int_n(catalog.readers.len())].clone();
            let loan = self.loan(book, &reader);
            catalog.loans.push(loan);
        }
        catalog
    }

    pub fn date_in_year(&mut self, year: i32) -> Date {
        let start = calendar_date(year, Month::January, 1);
        start + Duration::days(self.int_range(0, 364))
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }

    fn phone(&mut self) -> String {
        format!(
            "+7 9{:02} {:03}-{:02}-{:02}",
            self.int_range(0, 99),
            self.int_range(0, 999),
            self.int_range(0, 99),
            self.int_range(0, 99)
        )
    }

    fn address(&mut self) -> String {
        format!(
            "{}, ул. {}, {}",
            self.pick(&CITIES),
            self.pick(&STREETS),
            self.int_range(1, 120)
        )
    }
}

/// Marker the backend writes in `return_date` for open loans.
pub const UNRETURNED: &str = "не возвращена";

/// Two books whose authors sort differently under byte order and
/// collation.
pub fn sample_books() -> Vec<Record> {
    vec![
        Record::new()
            .with("title", "A")
            .with("author", "Иванов")
            .with("book_id", 1)
            .with("genre_id", 1)
            .with("library_id", 1)
            .with("quantity", 3),
        Record::new()
            .with("title", "B")
            .with("author", "Сидоров")
            .with("book_id", 2)
            .with("genre_id", 1)
            .with("library_id", 1)
            .with("quantity", 0),
    ]
}

pub fn sample_libraries() -> Vec<Record> {
    vec![
        Record::new()
            .with("library_id", 1)
            .with("name", "Central")
            .with("address", "Москва, ул. Ленина, 1"),
        Record::new()
            .with("library_id", 2)
            .with("name", "North")
            .with("address", "Тверь, ул. Мира, 7"),
    ]
}

pub fn sample_readers() -> Vec<Record> {
    vec![
        Record::new()
            .with("reader_id", 3)
            .with("full_name", "Иванов И.И.")
            .with("phone", "+7 900 000-00-00")
            .with("address", "Казань"),
    ]
}

/// Availability rows matching `sample_books` in `sample_libraries`.
pub fn sample_available_books() -> Vec<Record> {
    vec![
        Record::new()
            .with("book_title", "A")
            .with("book_author", "Иванов")
            .with("library_name", "Central")
            .with("available_quantity", 2)
            .with("total_quantity", 3),
    ]
}

pub fn fixture_date() -> &'static str {
    "2024-01-10"
}

/// Formats a date the way the backend's JSON encoder does.
pub fn rfc2822_date(date: Date) -> String {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] 00:00:00 GMT"
    );
    date.format(format).unwrap_or_else(|_| date.to_string())
}

pub fn temp_config_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("config.toml");
    Ok((dir, path))
}

/// Serializes records as the backend's JSON array body.
pub fn records_json(records: &[Record]) -> String {
    serde_json::to_string(records).unwrap_or_else(|_| "[]".to_owned())
}

fn calendar_date(year: i32, month: Month, day: u8) -> Date {
    Date::from_calendar_date(year, month, day).unwrap_or(Date::MIN)
}
