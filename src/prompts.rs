//! Fixed prompts sent to the chat-completion endpoint.
//! Kept in Spanish: the schema and the callers speak Spanish.

/// Schema of the only table the generator knows about.
pub const TABLE_SCHEMA: &str = "La base de datos contiene la tabla 'public.usuarios' con las siguientes columnas:
- id (SERIAL) -> Identificador único del usuario (PRIMARY KEY)
- nombre (VARCHAR) -> Nombre del usuario
- email (VARCHAR) -> Correo electrónico (único)
- edad (INT) -> Edad del usuario";

pub fn sql_generation_system_prompt() -> String {
    format!(
        "Eres un asistente experto en SQL para PostgreSQL. {}\n\
         Responde SOLO con la consulta SQL correcta para PostgreSQL. \
         No expliques nada, solo responde con la consulta SQL sin formateo adicional.",
        TABLE_SCHEMA
    )
}

pub fn sql_generation_user_prompt(user_input: &str) -> String {
    format!("Convierte esta consulta a SQL: {}", user_input)
}

pub const EXPLANATION_SYSTEM_PROMPT: &str = "Eres un asistente que ayuda a interpretar respuestas de una base de datos SQL. \
Dado un conjunto de resultados de una consulta SQL, genera una respuesta explicativa en lenguaje natural. \
No muestres la consulta SQL ni los datos en crudo, solo proporciona una explicación clara.";

pub fn explanation_user_prompt(rows_json: &str) -> String {
    format!(
        "Interpreta estos resultados y genera una respuesta detallada para el usuario: {}",
        rows_json
    )
}
