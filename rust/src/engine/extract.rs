//! Solution extractor: turns the chosen cell grid into per-day duty records.

use crate::catalog::{DutyCategory, SubPosition};
use crate::models::{DailyRecord, DutyRecord};

use super::model::RosterModel;
use super::RosterProblem;

/// Build one `DailyRecord` per work day, records in roster order.
///
/// Within a category the lead-of-record takes the lead seat first; everyone
/// else fills the remaining seats in roster order. Should a category hold more
/// people than seats, the overflow lands on the category's first seat.
pub fn extract(
    problem: &RosterProblem,
    model: &RosterModel,
    cells: &[DutyCategory],
) -> Vec<DailyRecord> {
    let category_of = |p: usize, d: usize| cells[model.cell_index(p, d)];

    (0..problem.n_days())
        .map(|day| {
            let date = problem.work_days[day];
            let mut seats: Vec<Option<SubPosition>> = vec![None; problem.n_people()];

            for category in DutyCategory::ALL {
                let lead = model.lead_of_record(day, category, category_of);
                if let (Some(lead), Some(seat)) = (lead, category.lead_seat()) {
                    seats[lead] = Some(seat);
                }

                let mut queue = category
                    .slots()
                    .iter()
                    .filter(|slot| !slot.requires_lead)
                    .flat_map(|slot| std::iter::repeat(slot.position).take(slot.count));
                let fallback = category.slots()[0].position;

                for person in (0..problem.n_people())
                    .filter(|&p| category_of(p, day) == category && Some(p) != lead)
                {
                    seats[person] = Some(queue.next().unwrap_or(fallback));
                }
            }

            let records = (0..problem.n_people())
                .map(|person| {
                    DutyRecord::new(
                        problem.person_id(person),
                        date,
                        category_of(person, day),
                        seats[person],
                    )
                })
                .collect();
            DailyRecord::new(date, records)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::*;

    /// Day 0 of a valid grid: p00 day, p01 sleep lead, p02 short lead, p03
    /// senior lead, p04/p05 day, then staff fill the rest.
    fn sample_cells(model: &RosterModel) -> Vec<DutyCategory> {
        use DutyCategory::*;
        let day0 = [
            Day, Sleep, ShortNight, SeniorNight, Day, Day, // leads
            Day, Day, Day, Sleep, Sleep, Sleep, Sleep, ShortNight, ShortNight, SeniorNight,
            SeniorNight,
        ];
        let mut cells = vec![Day; model.n_people() * model.n_days()];
        for (p, &c) in day0.iter().enumerate() {
            cells[model.cell_index(p, 0)] = c;
        }
        cells
    }

    #[test]
    fn test_lead_takes_lead_seat() {
        let problem = make_problem(1);
        let model = RosterModel::new(17, 1, &problem.lead_flags());
        let cells = sample_cells(&model);
        let schedule = extract(&problem, &model, &cells);

        assert_eq!(schedule.len(), 1);
        let day = &schedule[0];
        assert_eq!(day.records.len(), 17);
        assert_eq!(day.records[1].sub_position, Some(SubPosition::SleepLead));
        assert_eq!(day.records[2].sub_position, Some(SubPosition::ShortNightLead));
        assert_eq!(day.records[3].sub_position, Some(SubPosition::SeniorNightLead));
        assert_eq!(day.records[0].sub_position, Some(SubPosition::DayRegular));

        // Sleep regulars in roster order: two northwest, then two southeast.
        let sleep: Vec<SubPosition> = day.records[9..13]
            .iter()
            .filter_map(|r| r.sub_position)
            .collect();
        assert_eq!(
            sleep,
            vec![
                SubPosition::SleepNorthwest,
                SubPosition::SleepNorthwest,
                SubPosition::SleepSoutheast,
                SubPosition::SleepSoutheast
            ]
        );
        let ids: Vec<&str> = day.records.iter().map(|r| r.person_id.as_str()).collect();
        assert_eq!(ids[16], "p16");
    }

    #[test]
    fn test_overflow_falls_back_to_first_seat() {
        let problem = make_problem(1);
        let model = RosterModel::new(17, 1, &problem.lead_flags());
        let mut cells = sample_cells(&model);
        // p06 moves from day to senior night: four people, three seats.
        cells[model.cell_index(6, 0)] = DutyCategory::SeniorNight;
        let schedule = extract(&problem, &model, &cells);
        let seats: Vec<Option<SubPosition>> = schedule[0]
            .records
            .iter()
            .filter(|r| r.category == DutyCategory::SeniorNight)
            .map(|r| r.sub_position)
            .collect();
        assert_eq!(
            seats,
            vec![
                Some(SubPosition::SeniorNightLead),
                Some(SubPosition::SeniorNightRegular),
                Some(SubPosition::SeniorNightRegular),
                Some(SubPosition::SeniorNightLead),
            ]
        );
    }
}
