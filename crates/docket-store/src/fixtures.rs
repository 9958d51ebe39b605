use chrono::NaiveDate;
use docket_core::{Annex, Case, Document, Litigant, Movement};

pub fn sample_case(rol: &str, admission: NaiveDate) -> Case {
    Case {
        rol: rol.into(),
        cover: "BANCO / PEREZ".into(),
        admin_status: "Sin archivar".into(),
        process: "Ejecutivo".into(),
        admission,
        location: "Digital".into(),
        stage: "Ingreso".into(),
        process_state: "Tramitacion".into(),
        court: "1 Juzgado Civil de Santiago".into(),
        movements: vec![Movement {
            invoice: "1".into(),
            stage: "Ingreso".into(),
            procedure: "Escrito".into(),
            description: "Demanda".into(),
            date: admission,
            page: 1,
            book: "Principal".into(),
            documents: vec![
                Document {
                    name: "escrito_demanda_240304_0".into(),
                    index: 0,
                    annexes: vec![Annex {
                        name: "escrito_demanda_240305_poder_anexo".into(),
                        reference: "Poder".into(),
                        date: admission,
                    }],
                },
                Document {
                    name: "escrito_demanda_240304_1".into(),
                    index: 1,
                    annexes: vec![],
                },
            ],
        }],
        litigants: vec![Litigant {
            participant: "DTE.".into(),
            rut: "11.111.111-1".into(),
            person: "Juridica".into(),
            name: "BANCO".into(),
        }],
    }
}

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}
