use crate::domain::intent::{Obligation, ObligationStatus};

/// Open obligations whose due turn has arrived, including overdue ones.
///
/// Overdue obligations are never dropped: they stay open and keep being
/// reported here until a turn addresses them.
pub fn get_urgent_obligations(obligations: &[Obligation], current_turn: u32) -> Vec<&Obligation> {
    let mut urgent =
        obligations.iter().filter(|obligation| obligation.is_due(current_turn)).collect::<Vec<_>>();
    urgent.sort_by_key(|obligation| obligation.must_address_by_turn);
    urgent
}

/// Marks open obligations whose topic is covered by `turn_text`.
///
/// Returns the number of obligations that changed status.
pub fn mark_addressed(obligations: &mut [Obligation], turn_text: &str) -> usize {
    let haystack = turn_text.to_lowercase();
    let mut addressed = 0;
    for obligation in obligations.iter_mut().filter(|o| o.is_open()) {
        if covers_topic(&haystack, &obligation.topic) {
            obligation.status = ObligationStatus::Addressed;
            addressed += 1;
        }
    }
    addressed
}

/// Opens an obligation for `topic` unless an open one already exists.
pub fn defer_topic(
    obligations: &mut Vec<Obligation>,
    topic: &str,
    reason: &str,
    turn: u32,
) -> bool {
    let topic = topic.trim();
    if topic.is_empty() {
        return false;
    }
    let already_open =
        obligations.iter().any(|o| o.is_open() && o.topic.eq_ignore_ascii_case(topic));
    if already_open {
        return false;
    }
    obligations.push(Obligation::open(topic, reason, turn));
    true
}

fn covers_topic(lowercase_text: &str, topic: &str) -> bool {
    let topic = topic.trim().to_lowercase();
    !topic.is_empty() && lowercase_text.contains(&topic)
}

#[cfg(test)]
mod tests {
    use super::{defer_topic, get_urgent_obligations, mark_addressed};
    use crate::domain::intent::{Obligation, ObligationStatus};

    #[test]
    fn obligations_become_urgent_at_due_turn() {
        let obligations = vec![Obligation::open("isolatie", "uitgesteld", 1)];

        assert!(get_urgent_obligations(&obligations, 3).is_empty());
        assert_eq!(get_urgent_obligations(&obligations, 4).len(), 1);
    }

    #[test]
    fn overdue_obligations_stay_open_and_urgent() {
        let obligations = vec![Obligation::open("isolatie", "uitgesteld", 1)];

        let urgent = get_urgent_obligations(&obligations, 12);
        assert_eq!(urgent.len(), 1);
        assert!(urgent[0].is_overdue(12));
        assert_eq!(urgent[0].status, ObligationStatus::Open);
    }

    #[test]
    fn addressed_by_topic_containment() {
        let mut obligations = vec![
            Obligation::open("Vloerverwarming", "uitgesteld", 1),
            Obligation::open("kozijnen", "uitgesteld", 1),
        ];

        let changed = mark_addressed(&mut obligations, "Inzicht: vloerverwarming past bij uw plan.");
        assert_eq!(changed, 1);
        assert_eq!(obligations[0].status, ObligationStatus::Addressed);
        assert!(obligations[1].is_open());
        assert!(get_urgent_obligations(&obligations, 10).iter().all(|o| o.topic == "kozijnen"));
    }

    #[test]
    fn deferring_same_topic_twice_keeps_one_open() {
        let mut obligations = Vec::new();

        assert!(defer_topic(&mut obligations, "zonnepanelen", "later", 2));
        assert!(!defer_topic(&mut obligations, "Zonnepanelen", "later", 3));
        assert!(!defer_topic(&mut obligations, "  ", "later", 3));
        assert_eq!(obligations.len(), 1);
        assert_eq!(obligations[0].must_address_by_turn, 5);
    }
}
