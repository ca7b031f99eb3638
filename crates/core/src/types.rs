//! Cartilla record model.
//!
//! Serialized field names follow the persisted JSON shape (`uomNumero`,
//! `presionOperacionPSI`, `flujoFugaGPH`, `comentariosRevision`, ...).
//! States, roles and results serialize as their upper-case Spanish tags.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::error::LeakFlowError;
use crate::leak_flow::PressureTable;

// ──────────────────────────────────────────────
// Enumerations
// ──────────────────────────────────────────────

/// Workflow state of a cartilla.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Estado {
    #[serde(rename = "BORRADOR")]
    Draft,
    #[serde(rename = "EN_REVISION")]
    InReview,
    #[serde(rename = "APROBADA")]
    Approved,
    #[serde(rename = "RECHAZADA")]
    Rejected,
}

impl Estado {
    pub const ALL: [Estado; 4] = [
        Estado::Draft,
        Estado::InReview,
        Estado::Approved,
        Estado::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Estado::Draft => "BORRADOR",
            Estado::InReview => "EN_REVISION",
            Estado::Approved => "APROBADA",
            Estado::Rejected => "RECHAZADA",
        }
    }

    /// Parse the persisted tag back into a state.
    pub fn parse(tag: &str) -> Option<Estado> {
        Estado::ALL.into_iter().find(|e| e.as_str() == tag)
    }

    /// No workflow event leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Estado::Approved | Estado::Rejected)
    }
}

impl fmt::Display for Estado {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role resolved by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Field operator. Sees and edits only the cartillas they created.
    Operador,
    Supervisor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Operador => "OPERADOR",
            Role::Supervisor => "SUPERVISOR",
            Role::Admin => "ADMIN",
        }
    }

    /// Supervisors and admins may approve or reject.
    pub fn is_reviewer(&self) -> bool {
        matches!(self, Role::Supervisor | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// The lowest-privilege role only ever sees its own records.
    pub fn is_owner_scoped(&self) -> bool {
        matches!(self, Role::Operador)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations subject to a guard, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    View,
    Edit,
    Delete,
    SubmitForReview,
    Approve,
    Reject,
    ReplaceTable,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::View => "view",
            Operation::Edit => "edit",
            Operation::Delete => "delete",
            Operation::SubmitForReview => "submit for review",
            Operation::Approve => "approve",
            Operation::Reject => "reject",
            Operation::ReplaceTable => "replace the pressure table for",
        };
        f.write_str(s)
    }
}

/// Audit log action tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    SendReview,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Approve => "APPROVE",
            AuditAction::Reject => "REJECT",
            AuditAction::SendReview => "SEND_REVIEW",
        }
    }

    pub fn parse(tag: &str) -> Option<AuditAction> {
        [
            AuditAction::Create,
            AuditAction::Update,
            AuditAction::Delete,
            AuditAction::Approve,
            AuditAction::Reject,
            AuditAction::SendReview,
        ]
        .into_iter()
        .find(|a| a.as_str() == tag)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag on a review comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewAction {
    Approve,
    Reject,
}

/// Operator-asserted outcome of a test. Never derived from the flow value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultadoPrueba {
    Pasa,
    NoPasa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectorTipo {
    Mecanico,
    Electronico,
}

// ──────────────────────────────────────────────
// Actor
// ──────────────────────────────────────────────

/// An authenticated caller: user id plus role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn operador(id: impl Into<String>) -> Self {
        Self::new(id, Role::Operador)
    }

    pub fn supervisor(id: impl Into<String>) -> Self {
        Self::new(id, Role::Supervisor)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }
}

// ──────────────────────────────────────────────
// Record sections
// ──────────────────────────────────────────────

/// Station identification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instalacion {
    pub rut: String,
    pub nombre_sitio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compania: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codigo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direccion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comuna: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciudad: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rep_legal: Option<String>,
}

/// The party that commissioned the inspection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mandante {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_numero: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre_legal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
}

/// A tested line with its tank and the three tightness pressure readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineaDetalle {
    pub numero_linea: String,
    pub numero_estanque: String,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub capacidad_litros: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numero_serie_estanque: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bocas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo_linea: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diametro_pulgadas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipo_inspeccion: Option<String>,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub presion_inicial: Option<Decimal>,
    #[serde(
        default,
        rename = "presion5min",
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub presion_5min: Option<Decimal>,
    #[serde(
        default,
        rename = "presion25min",
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub presion_25min: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funcionalidad_detector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resultado_hermeticidad: Option<ResultadoPrueba>,
}

/// Detector pressure test as entered by the operator, before the leak-flow
/// threshold is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeakTestInput {
    pub numero_linea: String,
    pub numero_estanque: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacidad_litros: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bomba_sumergible_marca: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_marca: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_modelo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_tipo: Option<DetectorTipo>,
    #[serde(rename = "presionOperacionPSI", default)]
    pub presion_operacion_psi: Option<f64>,
    #[serde(rename = "presionVerificacionPSI", default, skip_serializing_if = "Option::is_none")]
    pub presion_verificacion_psi: Option<f64>,
    #[serde(rename = "presionDetencionPSI", default, skip_serializing_if = "Option::is_none")]
    pub presion_detencion_psi: Option<f64>,
    #[serde(rename = "presionPruebaPSI", default, skip_serializing_if = "Option::is_none")]
    pub presion_prueba_psi: Option<f64>,
    pub resultado: ResultadoPrueba,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observacion: Option<String>,
}

impl LeakTestInput {
    /// Minimal input: line, tank, operating pressure and result.
    pub fn new(
        numero_linea: impl Into<String>,
        numero_estanque: impl Into<String>,
        presion_operacion_psi: Option<f64>,
        resultado: ResultadoPrueba,
    ) -> Self {
        Self {
            numero_linea: numero_linea.into(),
            numero_estanque: numero_estanque.into(),
            capacidad_litros: None,
            producto: None,
            bomba_sumergible_marca: None,
            detector_marca: None,
            detector_modelo: None,
            detector_tipo: None,
            presion_operacion_psi,
            presion_verificacion_psi: None,
            presion_detencion_psi: None,
            presion_prueba_psi: None,
            resultado,
            observacion: None,
        }
    }
}

/// A detector pressure test line item.
///
/// `flujoFugaGPH` is always the table value for `presionOperacionPSI` at the
/// time the test was measured; both fields are private so the pair can only
/// be produced by [`LeakTest::measure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeakTest {
    pub numero_linea: String,
    pub numero_estanque: String,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub capacidad_litros: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bomba_sumergible_marca: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_marca: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_modelo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_tipo: Option<DetectorTipo>,
    #[serde(rename = "presionOperacionPSI", with = "rust_decimal::serde::float")]
    operating_pressure_psi: Decimal,
    #[serde(
        rename = "presionVerificacionPSI",
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub presion_verificacion_psi: Option<Decimal>,
    #[serde(
        rename = "presionDetencionPSI",
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub presion_detencion_psi: Option<Decimal>,
    #[serde(
        rename = "presionPruebaPSI",
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub presion_prueba_psi: Option<Decimal>,
    #[serde(rename = "flujoFugaGPH", with = "rust_decimal::serde::float")]
    leak_flow_gph: Decimal,
    pub resultado: ResultadoPrueba,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observacion: Option<String>,
}

impl LeakTest {
    /// Derive the leak-flow threshold for `input` from `table`.
    ///
    /// Fails with `InvalidInput` when the operating pressure is absent or not
    /// finite, or when any auxiliary reading is not finite.
    pub fn measure(input: LeakTestInput, table: &PressureTable) -> Result<Self, LeakFlowError> {
        let flow = table.leak_flow_opt(input.presion_operacion_psi)?;
        Ok(Self {
            numero_linea: input.numero_linea,
            numero_estanque: input.numero_estanque,
            capacidad_litros: optional_reading("capacidadLitros", input.capacidad_litros)?,
            producto: input.producto,
            bomba_sumergible_marca: input.bomba_sumergible_marca,
            detector_marca: input.detector_marca,
            detector_modelo: input.detector_modelo,
            detector_tipo: input.detector_tipo,
            operating_pressure_psi: flow.psi,
            presion_verificacion_psi: optional_reading(
                "presionVerificacionPSI",
                input.presion_verificacion_psi,
            )?,
            presion_detencion_psi: optional_reading(
                "presionDetencionPSI",
                input.presion_detencion_psi,
            )?,
            presion_prueba_psi: optional_reading("presionPruebaPSI", input.presion_prueba_psi)?,
            leak_flow_gph: flow.gph,
            resultado: input.resultado,
            observacion: input.observacion,
        })
    }

    pub fn operating_pressure_psi(&self) -> Decimal {
        self.operating_pressure_psi
    }

    pub fn leak_flow_gph(&self) -> Decimal {
        self.leak_flow_gph
    }
}

fn optional_reading(field: &str, value: Option<f64>) -> Result<Option<Decimal>, LeakFlowError> {
    value
        .map(|v| {
            crate::leak_flow::decimal_from_f64(v).map_err(|reason| LeakFlowError::InvalidInput {
                reason: format!("{field}: {reason}"),
            })
        })
        .transpose()
}

/// Appended on approve (optional) and reject (mandatory). Never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    #[serde(rename = "usuario")]
    pub author: String,
    #[serde(rename = "fecha", with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "accion")]
    pub action: ReviewAction,
    #[serde(rename = "comentario")]
    pub comment: String,
}

// ──────────────────────────────────────────────
// Cartilla
// ──────────────────────────────────────────────

/// Editable content of a cartilla, with leak-flow values already derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartillaContent {
    pub uom_numero: String,
    pub instalacion: Instalacion,
    #[serde(default)]
    pub mandante: Mandante,
    pub fecha_prueba: Date,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hora_inicio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hora_termino: Option<String>,
    pub inspector_nombre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ayudante_nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrador_nombre: Option<String>,
    #[serde(default)]
    pub lineas: Vec<LineaDetalle>,
    #[serde(default)]
    pub pruebas: Vec<LeakTest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firma_administrador: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firma_inspector: Option<String>,
}

/// Content submitted by the form layer on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartillaDraft {
    pub uom_numero: String,
    pub instalacion: Instalacion,
    #[serde(default)]
    pub mandante: Mandante,
    pub fecha_prueba: Date,
    #[serde(default)]
    pub hora_inicio: Option<String>,
    #[serde(default)]
    pub hora_termino: Option<String>,
    pub inspector_nombre: String,
    #[serde(default)]
    pub ayudante_nombre: Option<String>,
    #[serde(default)]
    pub administrador_nombre: Option<String>,
    #[serde(default)]
    pub lineas: Vec<LineaDetalle>,
    #[serde(default)]
    pub pruebas: Vec<LeakTestInput>,
    #[serde(default)]
    pub firma_administrador: Option<String>,
    #[serde(default)]
    pub firma_inspector: Option<String>,
}

impl CartillaDraft {
    /// A draft with the required fields and no lines or tests.
    pub fn new(
        uom_numero: impl Into<String>,
        instalacion: Instalacion,
        fecha_prueba: Date,
        inspector_nombre: impl Into<String>,
    ) -> Self {
        Self {
            uom_numero: uom_numero.into(),
            instalacion,
            mandante: Mandante::default(),
            fecha_prueba,
            hora_inicio: None,
            hora_termino: None,
            inspector_nombre: inspector_nombre.into(),
            ayudante_nombre: None,
            administrador_nombre: None,
            lineas: Vec::new(),
            pruebas: Vec::new(),
            firma_administrador: None,
            firma_inspector: None,
        }
    }

    /// Derive every test's leak-flow value with `table`.
    ///
    /// The first test with an invalid pressure fails the whole draft; the
    /// error names its position.
    pub fn measure(self, table: &PressureTable) -> Result<CartillaContent, LeakFlowError> {
        let pruebas = self
            .pruebas
            .into_iter()
            .enumerate()
            .map(|(i, input)| {
                LeakTest::measure(input, table).map_err(|e| match e {
                    LeakFlowError::InvalidInput { reason } => LeakFlowError::InvalidInput {
                        reason: format!("prueba {}: {reason}", i + 1),
                    },
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CartillaContent {
            uom_numero: self.uom_numero,
            instalacion: self.instalacion,
            mandante: self.mandante,
            fecha_prueba: self.fecha_prueba,
            hora_inicio: self.hora_inicio,
            hora_termino: self.hora_termino,
            inspector_nombre: self.inspector_nombre,
            ayudante_nombre: self.ayudante_nombre,
            administrador_nombre: self.administrador_nombre,
            lineas: self.lineas,
            pruebas,
            firma_administrador: self.firma_administrador,
            firma_inspector: self.firma_inspector,
        })
    }
}

/// An inspection record.
///
/// State, review history and ownership are private: `estado` only moves
/// through [`Cartilla::apply`], comments are only ever appended, and the
/// creator never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cartilla {
    pub id: String,
    #[serde(flatten)]
    content: CartillaContent,
    estado: Estado,
    #[serde(default)]
    comentarios_revision: Vec<ReviewComment>,
    created_by: String,
    #[serde(default)]
    updated_by: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl Cartilla {
    /// A new record in `BORRADOR`, owned by `owner`.
    pub fn new_draft(
        id: impl Into<String>,
        content: CartillaContent,
        owner: &Actor,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            content,
            estado: Estado::Draft,
            comentarios_revision: Vec::new(),
            created_by: owner.id.clone(),
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A copy with its content replaced and `actor` recorded as last modifier.
    ///
    /// Permission checks are the caller's job (see [`crate::access`]).
    pub fn with_content(&self, content: CartillaContent, actor: &Actor, now: OffsetDateTime) -> Self {
        Self {
            content,
            updated_by: Some(actor.id.clone()),
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn content(&self) -> &CartillaContent {
        &self.content
    }

    pub fn uom_numero(&self) -> &str {
        &self.content.uom_numero
    }

    pub fn estado(&self) -> Estado {
        self.estado
    }

    pub fn pruebas(&self) -> &[LeakTest] {
        &self.content.pruebas
    }

    pub fn comentarios_revision(&self) -> &[ReviewComment] {
        &self.comentarios_revision
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn updated_by(&self) -> Option<&str> {
        self.updated_by.as_deref()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    pub fn is_owned_by(&self, actor: &Actor) -> bool {
        self.created_by == actor.id
    }

    pub(crate) fn transitioned(
        &self,
        to: Estado,
        comment: Option<ReviewComment>,
        actor: &Actor,
        now: OffsetDateTime,
    ) -> Self {
        let mut comentarios_revision = self.comentarios_revision.clone();
        comentarios_revision.extend(comment);
        Self {
            estado: to,
            comentarios_revision,
            updated_by: Some(actor.id.clone()),
            updated_at: now,
            ..self.clone()
        }
    }
}
