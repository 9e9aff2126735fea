//! Stock and waitlist invariants under arbitrary sequences of lifecycle operations

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use proptest::prelude::*;

use school_library::{
    config::LoansConfig,
    models::{
        book::{BookQuery, CreateBook},
        loan::{
            ApproveCommand, Loan, LoanFilter, LoanStatus, ManualLoanCommand, RejectCommand,
            RequestLoanCommand, ReturnCommand,
        },
        waitlist::{JoinWaitlistCommand, WaitlistFilter},
    },
    repository::{MemoryStore, Store},
    services::{waitlist::DispatchOutcome, waitlist::RemoveFromWaitlist, Services},
    AppError,
};

const READERS: [&str; 4] = ["A", "B", "C", "D"];
const STAFF: &str = "Ana";

#[derive(Debug, Clone)]
enum Op {
    Request { reader: usize, book: usize },
    Manual { reader: usize, book: usize },
    Approve { loan: usize },
    Reject { loan: usize },
    Return { loan: usize },
    Join { reader: usize, book: usize },
    Leave { reader: usize, book: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    let reader = 0..READERS.len();
    let book = 0..2usize;
    let loan = 0..16usize;
    prop_oneof![
        (reader.clone(), book.clone()).prop_map(|(reader, book)| Op::Request { reader, book }),
        (reader.clone(), book.clone()).prop_map(|(reader, book)| Op::Manual { reader, book }),
        loan.clone().prop_map(|loan| Op::Approve { loan }),
        loan.clone().prop_map(|loan| Op::Reject { loan }),
        loan.prop_map(|loan| Op::Return { loan }),
        (reader.clone(), book.clone()).prop_map(|(reader, book)| Op::Join { reader, book }),
        (reader, book).prop_map(|(reader, book)| Op::Leave { reader, book }),
    ]
}

struct World {
    store: Arc<MemoryStore>,
    services: Services,
    books: Vec<i32>,
    loans: Vec<i32>,
}

impl World {
    async fn new(totals: &[i32]) -> Self {
        let store = Arc::new(MemoryStore::new());
        let services = Services::new(store.clone(), LoansConfig::default());
        let mut books = Vec::new();
        for (i, total) in totals.iter().enumerate() {
            let book = services
                .catalog
                .create_book(CreateBook {
                    title: format!("Livro {}", i + 1),
                    author: "Cora Coralina".to_string(),
                    genre: None,
                    publisher: None,
                    total: *total,
                    available: None,
                    cover_url: None,
                    location: None,
                    description: None,
                })
                .await
                .unwrap();
            books.push(book.id);
        }
        Self {
            store,
            services,
            books,
            loans: Vec::new(),
        }
    }

    fn pick_loan(&self, n: usize) -> Option<i32> {
        if self.loans.is_empty() {
            None
        } else {
            Some(self.loans[n % self.loans.len()])
        }
    }

    fn track(&mut self, dispatch: &Option<DispatchOutcome>) {
        if let Some(DispatchOutcome::Reassigned { loan, .. }) = dispatch {
            self.loans.push(loan.id);
        }
    }

    async fn apply(&mut self, op: &Op) -> Result<(), AppError> {
        let loans = &self.services.loans;
        match *op {
            Op::Request { reader, book } => {
                let loan = loans
                    .request_loan(RequestLoanCommand {
                        borrower_id: READERS[reader].to_string(),
                        book_id: self.books[book],
                        duration_days: 15,
                    })
                    .await?;
                self.loans.push(loan.id);
            }
            Op::Manual { reader, book } => {
                let loan = loans
                    .create_manual_loan(ManualLoanCommand {
                        book_id: self.books[book],
                        borrower_id: READERS[reader].to_string(),
                        duration_days: 10,
                        acting_staff: STAFF.to_string(),
                        force: false,
                    })
                    .await?;
                self.loans.push(loan.id);
            }
            Op::Approve { loan } => {
                if let Some(loan_id) = self.pick_loan(loan) {
                    loans
                        .approve(ApproveCommand {
                            loan_id,
                            acting_staff: STAFF.to_string(),
                            force: false,
                        })
                        .await?;
                }
            }
            Op::Reject { loan } => {
                if let Some(loan_id) = self.pick_loan(loan) {
                    let t = loans
                        .reject(RejectCommand {
                            loan_id,
                            acting_staff: STAFF.to_string(),
                        })
                        .await?;
                    self.track(&t.dispatch);
                }
            }
            Op::Return { loan } => {
                if let Some(loan_id) = self.pick_loan(loan) {
                    let t = loans
                        .return_book(ReturnCommand {
                            loan_id,
                            acting_staff: STAFF.to_string(),
                        })
                        .await?;
                    self.track(&t.dispatch);
                }
            }
            Op::Join { reader, book } => {
                self.services
                    .waitlist
                    .join(JoinWaitlistCommand {
                        book_id: self.books[book],
                        borrower_id: READERS[reader].to_string(),
                    })
                    .await?;
            }
            Op::Leave { reader, book } => {
                let queued = self
                    .services
                    .waitlist
                    .for_borrower(READERS[reader])
                    .await?;
                if let Some(q) = queued.iter().find(|q| q.entry.book_id == self.books[book]) {
                    self.services
                        .waitlist
                        .remove(RemoveFromWaitlist {
                            entry_id: q.entry.id,
                            borrower_id: Some(READERS[reader].to_string()),
                        })
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn all_loans(&self) -> Vec<Loan> {
        let mut tx = self.store.begin().await.unwrap();
        tx.find_loans(&LoanFilter::default()).await.unwrap()
    }

    /// Check every invariant; returns the current loans for terminal tracking
    async fn check(&self) -> Result<Vec<Loan>, TestCaseError> {
        let mut tx = self.store.begin().await.unwrap();
        let (books, _) = tx.find_books(&BookQuery::default()).await.unwrap();
        let loans = tx.find_loans(&LoanFilter::default()).await.unwrap();
        let entries = tx
            .find_waitlist_entries(&WaitlistFilter::default())
            .await
            .unwrap();
        drop(tx);

        for book in &books {
            prop_assert!(book.available >= 0, "negative stock: {:?}", book);
            prop_assert!(book.available <= book.total, "stock above total: {:?}", book);

            // Every owned copy is on the shelf, out on loan, or held for a reader
            let out = loans
                .iter()
                .filter(|l| l.book_id == book.id && l.returned_at.is_none())
                .filter(|l| {
                    l.status == LoanStatus::Approved
                        || (l.status == LoanStatus::Requested && l.copy_reserved)
                })
                .count() as i32;
            prop_assert_eq!(book.available + out, book.total, "copies lost for {:?}", book);
        }

        let mut open = HashSet::new();
        for loan in loans.iter().filter(|l| l.is_open()) {
            prop_assert!(open.insert(loan.borrower_id.clone()), "two open loans for {}", loan.borrower_id);
        }

        let mut pairs = HashSet::new();
        for entry in &entries {
            prop_assert!(pairs.insert((entry.book_id, entry.borrower_id.clone())));
        }

        Ok(loans)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_lifecycle_invariants_hold(ops in prop::collection::vec(arb_op(), 1..40)) {
        tokio_test::block_on(async {
            let mut world = World::new(&[1, 2]).await;
            let mut terminal: HashMap<i32, Loan> = HashMap::new();

            for op in &ops {
                match world.apply(op).await {
                    Ok(()) => {}
                    Err(AppError::StorageUnavailable(e)) | Err(AppError::Schema(e)) => {
                        return Err(TestCaseError::fail(format!("storage failure on {:?}: {}", op, e)));
                    }
                    // Conflicts, invalid transitions and empty shelves are expected outcomes
                    Err(_) => {}
                }

                let loans = world.check().await?;
                for loan in &loans {
                    if let Some(before) = terminal.get(&loan.id) {
                        prop_assert_eq!(before, loan, "terminal loan changed after {:?}", op);
                    } else if loan.status.is_terminal() {
                        terminal.insert(loan.id, loan.clone());
                    }
                }
            }
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_fifo_promotion_one_notification_each() {
    let mut world = World::new(&[1]).await;
    world.apply(&Op::Manual { reader: 3, book: 0 }).await.unwrap();
    for reader in [0, 1, 2] {
        world.apply(&Op::Join { reader, book: 0 }).await.unwrap();
    }

    let mut order = Vec::new();
    let mut current = world.loans[0];
    for _ in 0..3 {
        let t = world
            .services
            .loans
            .return_book(ReturnCommand {
                loan_id: current,
                acting_staff: STAFF.to_string(),
            })
            .await
            .unwrap();
        let Some(DispatchOutcome::Reassigned { loan, .. }) = t.dispatch else {
            panic!("expected reassignment");
        };
        order.push(loan.borrower_id.clone());
        world
            .services
            .loans
            .approve(ApproveCommand {
                loan_id: loan.id,
                acting_staff: STAFF.to_string(),
                force: false,
            })
            .await
            .unwrap();
        current = loan.id;
    }
    assert_eq!(order, vec!["A", "B", "C"]);

    for reader in ["A", "B", "C"] {
        let notes = world.services.notifications.list(reader).await.unwrap();
        assert_eq!(notes.len(), 1, "{} should be notified once", reader);
    }
    assert!(world.services.notifications.list("D").await.unwrap().is_empty());

    // Queue drained: the last return goes back on the shelf
    let t = world
        .services
        .loans
        .return_book(ReturnCommand {
            loan_id: current,
            acting_staff: STAFF.to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(
        t.dispatch,
        Some(DispatchOutcome::Restocked { available: Some(1) })
    ));
}

#[tokio::test]
async fn test_return_either_reassigns_or_restocks() {
    let mut world = World::new(&[2]).await;
    world.apply(&Op::Manual { reader: 0, book: 0 }).await.unwrap();
    world.apply(&Op::Manual { reader: 1, book: 0 }).await.unwrap();
    world.apply(&Op::Join { reader: 2, book: 0 }).await.unwrap();
    let before = world.all_loans().await.len();

    // First return goes to C; shelf count untouched
    world.apply(&Op::Return { loan: 0 }).await.unwrap();
    assert_eq!(world.all_loans().await.len(), before + 1);
    assert_eq!(world.services.catalog.get_book(world.books[0]).await.unwrap().available, 0);

    // Second return finds an empty queue; one copy back, no new loan
    world.apply(&Op::Return { loan: 1 }).await.unwrap();
    assert_eq!(world.all_loans().await.len(), before + 1);
    assert_eq!(world.services.catalog.get_book(world.books[0]).await.unwrap().available, 1);
}
