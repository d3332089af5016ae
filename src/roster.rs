//! The distributor table and its mutation rules.
//!
//! One row per city assignment. A distributor owns every row carrying its
//! name; a (state, city) pair belongs to at most one distributor. Edits
//! replace the distributor's whole row set; deletes drop it. Every mutation
//! bumps a revision counter so a stale client gets a conflict instead of
//! silently overwriting another session's work.
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One city assignment. Latitude/longitude are kept as the spreadsheet keeps
/// them: free text, empty when unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(rename = "Distribuidor", default)]
    pub distribuidor: String,
    #[serde(rename = "Contato", default)]
    pub contato: String,
    #[serde(rename = "Estado", default)]
    pub estado: String,
    #[serde(rename = "Cidade", default)]
    pub cidade: String,
    #[serde(rename = "Latitude", default)]
    pub latitude: String,
    #[serde(rename = "Longitude", default)]
    pub longitude: String,
}

impl Row {
    /// Rows missing any of the identifying fields are dropped before a write.
    pub fn is_complete(&self) -> bool {
        !self.distribuidor.trim().is_empty()
            && !self.contato.trim().is_empty()
            && !self.estado.trim().is_empty()
            && !self.cidade.trim().is_empty()
    }
}

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\d{2}\) \d{4,5}-\d{4}$").unwrap());

/// Accepts `(NN) NNNNN-NNNN` and `(NN) NNNN-NNNN`.
pub fn validate_phone(contato: &str) -> bool {
    PHONE.is_match(contato)
}

/// Drops repeated selections, keeping first-seen order. A multiselect that
/// sends the same city twice would otherwise insert two identical rows.
pub fn dedupe_cities(cidades: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(cidades.len());
    for cidade in cidades {
        if !unique.iter().any(|c| c == cidade) {
            unique.push(cidade.clone());
        }
    }
    unique
}

pub struct Roster {
    rows: Vec<Row>,
    revision: u64,
}

impl Roster {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows, revision: 0 }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn ensure_revision(&self, got: u64) -> Result<(), AppError> {
        if got != self.revision {
            return Err(AppError::StaleRevision {
                current: self.revision,
                got,
            });
        }
        Ok(())
    }

    /// Unique distributor names, in first-seen row order.
    pub fn distributor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for row in &self.rows {
            if !names.iter().any(|n| n == &row.distribuidor) {
                names.push(row.distribuidor.clone());
            }
        }
        names
    }

    pub fn has_distributor(&self, nome: &str) -> bool {
        self.rows.iter().any(|r| r.distribuidor == nome)
    }

    /// City-ownership conflicts for the given (state, city) selection,
    /// formatted with the current owner. `exclude` names a distributor whose
    /// own rows do not count, so an edit does not collide with itself.
    pub fn city_conflicts(
        &self,
        estado: &str,
        cidades: &[String],
        exclude: Option<&str>,
    ) -> Vec<String> {
        let mut taken = Vec::new();
        for cidade in cidades {
            let owner = self.rows.iter().find(|r| {
                r.estado == estado
                    && &r.cidade == cidade
                    && exclude.is_none_or(|nome| r.distribuidor != nome)
            });
            if let Some(row) = owner {
                taken.push(format!(
                    "{cidade} (atualmente atribuída a {})",
                    row.distribuidor
                ));
            }
        }
        taken
    }

    pub fn check_register(
        &self,
        nome: &str,
        contato: &str,
        estado: &str,
        cidades: &[String],
    ) -> Result<(), AppError> {
        if nome.trim().is_empty()
            || contato.trim().is_empty()
            || estado.trim().is_empty()
            || cidades.is_empty()
        {
            return Err(AppError::Validation("Preencha todos os campos!".into()));
        }
        if !validate_phone(contato.trim()) {
            return Err(AppError::Validation(
                "Contato inválido! Use o formato (XX) XXXXX-XXXX".into(),
            ));
        }
        if self.has_distributor(nome) {
            return Err(AppError::Validation("Distribuidor já cadastrado!".into()));
        }
        let taken = self.city_conflicts(estado, cidades, None);
        if !taken.is_empty() {
            return Err(AppError::Validation(conflict_message(&taken)));
        }
        Ok(())
    }

    /// Checks an edit of the distributor currently named `original`. The
    /// conflict scan excludes rows still carrying the pre-edit name, so a
    /// rename keeps excluding the old identity.
    pub fn check_edit(
        &self,
        original: &str,
        nome: &str,
        contato: &str,
        estado: &str,
        cidades: &[String],
    ) -> Result<(), AppError> {
        if !self.has_distributor(original) {
            return Err(AppError::UnknownDistributor);
        }
        if nome.trim().is_empty() || estado.trim().is_empty() {
            return Err(AppError::Validation("Preencha todos os campos!".into()));
        }
        if !validate_phone(contato.trim()) {
            return Err(AppError::Validation(
                "Contato inválido! Use o formato (XX) XXXXX-XXXX".into(),
            ));
        }
        let taken = self.city_conflicts(estado, cidades, Some(original));
        if !taken.is_empty() {
            return Err(AppError::Validation(conflict_message(&taken)));
        }
        Ok(())
    }

    pub fn apply_register(&mut self, novos: Vec<Row>) {
        self.rows.extend(novos);
        self.revision += 1;
    }

    /// Drops every row of `original` and inserts the fresh set. A city left
    /// out of the new selection simply has no replacement row.
    pub fn apply_edit(&mut self, original: &str, novos: Vec<Row>) {
        self.rows.retain(|r| r.distribuidor != original);
        self.rows.extend(novos);
        self.revision += 1;
    }

    /// Removes every row of the distributor, returning how many went.
    pub fn apply_delete(&mut self, nome: &str) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| r.distribuidor != nome);
        self.revision += 1;
        before - self.rows.len()
    }
}

fn conflict_message(taken: &[String]) -> String {
    format!(
        "As seguintes cidades já estão atribuídas a outros distribuidores:\n{}",
        taken.join("\n")
    )
}
