//! Spoken greetings for voice sessions.

use rand::seq::SliceRandom;

const GREETINGS: [&str; 10] = [
    "Hola, soy su asistente legal virtual. Estoy aquí para ayudarle con consultas jurídicas, documentación y orientación en asuntos legales. ¿En qué puedo asistirle hoy?",
    "Buenos días. Soy su asistente legal especializado en derecho civil, mercantil y laboral. ¿Sobre qué aspecto legal necesita asesoramiento?",
    "Bienvenido al servicio de asistencia legal virtual. Puedo ayudarle con consultas, redacción de documentos y orientación jurídica general. ¿Cuál es su consulta?",
    "Hola, soy su consultor jurídico digital. Puedo asistirle en materias legales, revisión de contratos y asesoramiento normativo. ¿En qué puedo servirle?",
    "Buen día. Como asistente legal, puedo orientarle sobre derechos y obligaciones, procedimientos judiciales y documentación legal. ¿Qué requiere hoy?",
    "Saludos. Soy su asistente en asuntos legales, especializado en derecho mexicano. Puedo ayudarle con consultas, formatos y trámites jurídicos. ¿Cómo puedo apoyarle?",
    "Hola, bienvenido al sistema de asesoría legal. Estoy aquí para resolver sus dudas jurídicas y explicar conceptos legales. ¿Cuál es su situación?",
    "Buenos días. Como asistente jurídico virtual, puedo orientarle en contratos, demandas, recursos legales y cumplimiento normativo. ¿Sobre qué tema desea consultar?",
    "Hola, soy su asistente para temas legales. Ofrezco asesoría en derecho civil, mercantil, laboral y administrativo. ¿En qué área necesita ayuda?",
    "Bienvenido al servicio de consultoría legal. Puedo asistirle con análisis de casos, revisión documental y orientación procesal. ¿Cómo puedo ayudarle hoy?",
];

pub fn random_greeting() -> &'static str {
    GREETINGS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(GREETINGS[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_comes_from_pool() {
        for _ in 0..20 {
            assert!(GREETINGS.contains(&random_greeting()));
        }
    }
}
