//! Acting identity passed explicitly into every state-changing call

/// Dashboard roles as stored on user accounts. Cashiers come in two
/// flavours: internal ones operate on every receipt, external ones are
/// scoped to their company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Chauffeur,
    Planificateur,
    CaissierInterne,
    CaissierExterne,
    Admin,
}

impl Role {
    /// Privileged roles may revoke validations and recoveries.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::CaissierInterne)
    }

    pub fn is_caissier(&self) -> bool {
        matches!(self, Role::CaissierInterne | Role::CaissierExterne)
    }
}

/// Who is performing an operation. There is no ambient current-user state
/// anywhere in the core; every mutation names its actor so the audit trail
/// can record it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub name: Option<String>,
    pub role: Role,
    /// Company the actor belongs to, set for external users only. Drives
    /// receipt visibility filtering.
    pub company_id: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            role,
            company_id: None,
        }
    }

    pub fn with_company(mut self, company_id: impl Into<String>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }
}
