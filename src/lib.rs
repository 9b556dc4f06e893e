//! QueryLens - Motor de consultas en lenguaje natural sobre CSV
//!
//! QueryLens convierte preguntas en lenguaje natural sobre datasets CSV en
//! planes de ejecución estructurados, decidiendo por consulta entre el motor
//! semántico, el LLM o una combinación de ambos.
//!
//! # Arquitectura
//!
//! - **Agent Orchestrator**: Registro central de agentes con envoltura de
//!   ejecución (timeout, reintentos, contadores de salud)
//! - **Intent Classifier**: Clasificación por patrones con extracción de
//!   entidades contra el esquema del dataset
//! - **Query Planner**: Planes como DAG de pasos con estimación de costo y
//!   claves de cache deterministas
//! - **Conversation Agent**: Contexto de sesión acotado y routing con
//!   fallback al LLM
//!
//! # Módulos Principales
//!
//! - [`agent`] - Orquestación, clasificación, planificación y routing
//! - [`config`] - Configuración por archivo JSON con overrides de entorno
//! - [`types`] - Tipos de dominio compartidos con los colaboradores externos
//!
//! # Ejemplo de Uso
//!
//! ```rust,no_run
//! use querylens::agent::AgentOrchestrator;
//! use querylens::config::AppConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::load(None)?;
//! let orchestrator = AgentOrchestrator::new(config);
//! // register agents, then:
//! // let profile = orchestrator.process_data_upload(file).await?;
//! // let answer = orchestrator.execute_query("sum of sales", &profile.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod logging;
pub mod types;

pub use agent::{AgentOrchestrator, IntentClassifier, QueryPlanner};
pub use config::AppConfig;
pub use types::{AnalysisResult, DataProfile, RoutingStrategy, UploadedFile};
