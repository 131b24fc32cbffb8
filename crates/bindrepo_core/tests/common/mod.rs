#![allow(dead_code)]

use bindrepo_core::{
    Application, BindConfig, Column, Model, RepositoryExtension, SqlRepository, Timestamps,
};
use rusqlite::types::Value;
use rusqlite::Row;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: Option<i64>,
    pub title: String,
    pub done: bool,
    pub timestamps: Timestamps,
}

impl Task {
    pub fn new(title: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            done: false,
            timestamps: Timestamps::default(),
        }
    }

    pub fn with_id(id: i64, title: &str) -> Self {
        Self {
            id: Some(id),
            ..Self::new(title)
        }
    }

    pub fn done(mut self) -> Self {
        self.done = true;
        self
    }
}

impl Model for Task {
    const TABLE: &'static str = "tasks";
    const PRIMARY_KEY: Column = Column::new("id", "INTEGER");
    const COLUMNS: &'static [Column] = &[
        Column::new("title", "TEXT"),
        Column::new("done", "INTEGER"),
    ];

    type Key = i64;

    fn primary_key(&self) -> Option<i64> {
        self.id
    }

    fn set_generated_key(&mut self, rowid: i64) {
        self.id = Some(rowid);
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("title", Value::Text(self.title.clone())),
            ("done", Value::from(self.done)),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            done: row.get("done")?,
            timestamps: Timestamps::from_row(row)?,
        })
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    fn timestamps_mut(&mut self) -> &mut Timestamps {
        &mut self.timestamps
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audit {
    pub id: Option<i64>,
    pub action: String,
    pub timestamps: Timestamps,
}

impl Audit {
    pub fn new(action: &str) -> Self {
        Self {
            id: None,
            action: action.to_string(),
            timestamps: Timestamps::default(),
        }
    }
}

impl Model for Audit {
    const TABLE: &'static str = "audits";
    const PRIMARY_KEY: Column = Column::new("id", "INTEGER");
    const COLUMNS: &'static [Column] = &[Column::new("action", "TEXT")];

    type Key = i64;

    fn primary_key(&self) -> Option<i64> {
        self.id
    }

    fn set_generated_key(&mut self, rowid: i64) {
        self.id = Some(rowid);
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        vec![("action", Value::Text(self.action.clone()))]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            action: row.get("action")?,
            timestamps: Timestamps::from_row(row)?,
        })
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    fn timestamps_mut(&mut self) -> &mut Timestamps {
        &mut self.timestamps
    }
}

/// Application with one in-memory bind `main` holding the `tasks` table.
pub fn task_app() -> (Application, SqlRepository<Task>) {
    let mut app = Application::new("tests").with_binds(vec![BindConfig::new("main")]);
    let manager = RepositoryExtension::init_app(&mut app).unwrap();
    manager.register_model::<Task>("main").unwrap();
    manager.create_all().unwrap();
    let repo = SqlRepository::from_app(&app).unwrap();
    (app, repo)
}
